//! Resolves decoded requests against the single live target.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use hwp_bridge_protocol::{
    Request, Response, Value, METHOD_CREATE, METHOD_DESTROY, METHOD_SHUTDOWN,
};

use crate::target::{Member, RemoteTarget, TargetError, TargetFactory, TargetResult};

/// What the host loop should do after sending a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

/// Owns the remote target and turns each request into exactly one response.
///
/// Failures inside the target, panics included, are reported to the caller as
/// error responses and never escape `dispatch`.
pub struct RequestDispatcher<F> {
    factory: F,
    target: Option<Box<dyn RemoteTarget>>,
}

impl<F: TargetFactory> RequestDispatcher<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            target: None,
        }
    }

    /// Whether a `create` is currently in effect.
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    /// Handle one request.
    pub fn dispatch(&mut self, request: &Request) -> (Response, Flow) {
        if let Err(e) = request.validate() {
            return (Response::invalid_request(e.to_string()), Flow::Continue);
        }

        tracing::debug!(
            method = %request.method,
            args = ?request.args,
            kwargs = ?request.kwargs,
            "dispatching request"
        );

        let (response, flow) = match request.method.as_str() {
            METHOD_CREATE => (self.create(request), Flow::Continue),
            METHOD_DESTROY => {
                if self.target.take().is_some() {
                    tracing::info!("target destroyed");
                }
                (Response::ok(true), Flow::Continue)
            }
            METHOD_SHUTDOWN => {
                self.target = None;
                tracing::info!("shutdown requested");
                (Response::ok(METHOD_SHUTDOWN), Flow::Shutdown)
            }
            name => (self.dispatch_member(name, request), Flow::Continue),
        };

        match &response {
            Response::Ok { value } => {
                tracing::debug!(method = %request.method, result = %value, "request succeeded")
            }
            Response::Error { message, kind } => {
                tracing::debug!(method = %request.method, ?kind, %message, "request failed")
            }
        }

        (response, flow)
    }

    fn create(&mut self, request: &Request) -> Response {
        // Only one target may be alive at a time.
        self.target = None;

        let factory = &mut self.factory;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            factory.create(&request.args, &request.kwargs)
        }));

        match outcome {
            Ok(Ok(target)) => {
                self.target = Some(target);
                tracing::info!(args = ?request.args, "target created");
                Response::ok(true)
            }
            Ok(Err(e)) => Response::error(format!("create failed: {e}")),
            Err(payload) => Response::error(format!(
                "create panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    fn dispatch_member(&mut self, name: &str, request: &Request) -> Response {
        let Some(target) = self.target.as_mut() else {
            return Response::unknown_method(name);
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> TargetResult<Option<Value>> {
            match target.resolve(name) {
                None => Ok(None),
                Some(Member::Method) => target
                    .invoke(name, &request.args, &request.kwargs)
                    .map(Some),
                Some(Member::Property) => access_property(&mut **target, name, request).map(Some),
            }
        }));

        match outcome {
            Ok(Ok(Some(value))) => Response::ok(value),
            Ok(Ok(None)) => Response::unknown_method(name),
            Ok(Err(e)) => Response::error(e.to_string()),
            Err(payload) => Response::error(format!(
                "{name} panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }
}

/// No argument reads the property; a single value, positional or as the
/// keyword `value`, writes it.
fn access_property(
    target: &mut dyn RemoteTarget,
    name: &str,
    request: &Request,
) -> TargetResult<Value> {
    let args = &request.args;
    let kwargs = &request.kwargs;

    if args.is_empty() && kwargs.is_empty() {
        return target.get(name);
    }

    let value = match (args.as_slice(), kwargs.len()) {
        ([value], 0) => value.clone(),
        ([], 1) => kwargs.get("value").cloned().ok_or_else(|| {
            TargetError::InvalidArguments(format!(
                "property '{name}' only accepts the keyword 'value'"
            ))
        })?,
        _ => {
            return Err(TargetError::InvalidArguments(format!(
                "property '{name}' takes at most one value"
            )))
        }
    };

    target.set(name, value)?;
    Ok(Value::Null)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwp_bridge_protocol::{FailureKind, Kwargs};
    use pretty_assertions::assert_eq;

    /// Records inserted text as its read-only `title`; `zoom` is writable.
    #[derive(Default)]
    struct Recorder {
        text: String,
        zoom: i64,
    }

    impl RemoteTarget for Recorder {
        fn resolve(&self, name: &str) -> Option<Member> {
            match name {
                "insert_text" | "explode" => Some(Member::Method),
                "zoom" | "title" => Some(Member::Property),
                _ => None,
            }
        }

        fn invoke(&mut self, name: &str, args: &[Value], _kwargs: &Kwargs) -> TargetResult<Value> {
            match name {
                "insert_text" => {
                    let text = args
                        .first()
                        .and_then(Value::as_str)
                        .ok_or_else(|| TargetError::InvalidArguments("text".into()))?;
                    self.text.push_str(text);
                    Ok(Value::Bool(true))
                }
                "explode" => panic!("kaboom"),
                _ => unreachable!(),
            }
        }

        fn get(&mut self, name: &str) -> TargetResult<Value> {
            match name {
                "zoom" => Ok(Value::Int(self.zoom)),
                _ => Ok(Value::from(self.text.clone())),
            }
        }

        fn set(&mut self, name: &str, value: Value) -> TargetResult<()> {
            match name {
                "zoom" => {
                    self.zoom = value.as_i64().unwrap_or_default();
                    Ok(())
                }
                _ => Err(TargetError::ReadOnly(name.to_string())),
            }
        }
    }

    fn dispatcher() -> RequestDispatcher<impl TargetFactory> {
        RequestDispatcher::new(|_: &[Value], _: &Kwargs| -> TargetResult<Box<dyn RemoteTarget>> {
            Ok(Box::new(Recorder::default()))
        })
    }

    #[test]
    fn test_create_insert_shutdown_scenario() {
        let mut d = dispatcher();

        let (resp, flow) = d.dispatch(&Request::create(vec![true.into(), true.into()], Kwargs::new()));
        assert_eq!(resp, Response::ok(true));
        assert_eq!(flow, Flow::Continue);

        let (resp, _) = d.dispatch(&Request::new("insert_text").arg("hello"));
        assert_eq!(resp, Response::ok(true));

        let (resp, flow) = d.dispatch(&Request::shutdown());
        assert_eq!(resp, Response::ok("shutdown"));
        assert_eq!(flow, Flow::Shutdown);
        assert!(!d.has_target());
    }

    #[test]
    fn test_unknown_method_before_create() {
        let mut d = dispatcher();
        let (resp, flow) = d.dispatch(&Request::new("nonexistent_op"));
        assert_eq!(
            resp,
            Response::Error {
                message: "Unknown method: nonexistent_op".to_string(),
                kind: FailureKind::UnknownMethod,
            }
        );
        assert_eq!(flow, Flow::Continue);
    }

    #[test]
    fn test_unknown_method_on_live_target() {
        let mut d = dispatcher();
        d.dispatch(&Request::create(vec![], Kwargs::new()));
        let (resp, _) = d.dispatch(&Request::new("fly"));
        assert_eq!(resp, Response::unknown_method("fly"));
        assert!(d.has_target());
    }

    #[test]
    fn test_property_read_write() {
        let mut d = dispatcher();
        d.dispatch(&Request::create(vec![], Kwargs::new()));

        assert_eq!(d.dispatch(&Request::new("zoom").arg(150)).0, Response::ok(Value::Null));
        assert_eq!(d.dispatch(&Request::new("zoom")).0, Response::ok(150));
        assert_eq!(
            d.dispatch(&Request::new("zoom").kwarg("value", 90)).0,
            Response::ok(Value::Null)
        );
        assert_eq!(d.dispatch(&Request::new("zoom")).0, Response::ok(90));

        let (resp, _) = d.dispatch(&Request::new("title").arg("x"));
        assert_eq!(resp, Response::error("Property 'title' is read-only"));

        let (resp, _) = d.dispatch(&Request::new("zoom").arg(1).arg(2));
        assert!(!resp.is_ok());
    }

    #[test]
    fn test_panic_becomes_error_and_target_survives() {
        let mut d = dispatcher();
        d.dispatch(&Request::create(vec![], Kwargs::new()));

        let (resp, flow) = d.dispatch(&Request::new("explode"));
        assert_eq!(resp, Response::error("explode panicked: kaboom"));
        assert_eq!(flow, Flow::Continue);
        assert_eq!(d.dispatch(&Request::new("insert_text").arg("still here")).0, Response::ok(true));
    }

    #[test]
    fn test_destroy_then_calls_are_unknown() {
        let mut d = dispatcher();
        d.dispatch(&Request::create(vec![], Kwargs::new()));
        assert_eq!(d.dispatch(&Request::destroy()).0, Response::ok(true));
        assert_eq!(
            d.dispatch(&Request::new("insert_text").arg("x")).0,
            Response::unknown_method("insert_text")
        );
    }

    #[test]
    fn test_empty_method_is_invalid_request() {
        let mut d = dispatcher();
        let (resp, _) = d.dispatch(&Request::new(""));
        assert!(matches!(
            resp,
            Response::Error {
                kind: FailureKind::InvalidRequest,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_create_leaves_no_target() {
        let mut d = RequestDispatcher::new(
            |_: &[Value], _: &Kwargs| -> TargetResult<Box<dyn RemoteTarget>> {
                Err(TargetError::Failed("automation server not registered".into()))
            },
        );
        let (resp, _) = d.dispatch(&Request::create(vec![], Kwargs::new()));
        assert_eq!(
            resp,
            Response::error("create failed: automation server not registered")
        );
        assert!(!d.has_target());
    }
}
