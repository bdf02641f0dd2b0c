//! `prevu version` command.

use miette::Result;

pub fn run(json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({ "name": "prevu", "version": prevu_core::VERSION })
        );
    } else {
        println!("prevu {}", prevu_core::VERSION);
    }
    Ok(())
}
