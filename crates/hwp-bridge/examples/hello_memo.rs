//! Example: run the bridge end to end against the in-memory `memo` target.
//!
//! Prerequisites:
//!   cargo build -p hwp-bridge-host
//!
//! Run:
//!   HWP_BRIDGE_HOST=target/debug/hwp-bridge-host cargo run --example hello_memo -p hwp-bridge
//!
//! Drop `with_memo_target()` (and set `HWP_BRIDGE_LAUNCHER=wine` on Linux) to
//! drive the real word processor instead.

use hwp_bridge::{BridgeConfig, Hwp};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let hwp = Hwp::start(BridgeConfig::from_env().with_memo_target())?;

    println!("version: {}", hwp.version()?);
    hwp.insert_text("Hello, ")?;
    hwp.insert_text("bridge")?;
    println!("text: {}", hwp.get_text()?);

    hwp.set_edit_mode(0)?;
    println!("edit mode: {}", hwp.edit_mode()?);

    match hwp.call("create_table", vec![2.into(), 3.into()]) {
        Ok(v) => println!("create_table: {v}"),
        Err(e) => println!("create_table: {e}"),
    }

    hwp.shutdown();
    Ok(())
}
