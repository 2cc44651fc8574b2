//! Version command implementation

use crate::defaults;
use crate::error::Result;

/// Prints the version and the defaults a bootstrap run starts from.
pub fn run() -> Result<()> {
    let profile = if cfg!(debug_assertions) { "debug" } else { "release" };
    println!("groundwork {} ({profile})", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Defaults:");
    println!("  Registry:            {}", defaults::DEFAULT_REGISTRY);
    println!("  Bootstrap component: {}", defaults::BOOTSTRAP_COMPONENT);
    println!("  Components:          {}", defaults::all_components().join(", "));
    Ok(())
}
