//! Convert Command
//!
//! Convert existing markup for a target framework, no model involved.
//!
//! Usage:
//!   uiforge convert page.html --target react -o Page.jsx
//!   cat snippet.html | uiforge convert --target svelte

use console::style;
use std::io::Read;
use std::path::PathBuf;

use crate::convert::{ConversionTarget, convert_named};
use crate::markup;
use crate::types::Result;

pub fn run(
    input: Option<PathBuf>,
    target: ConversionTarget,
    name: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let source = match &input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let tree = markup::parse(&source)?;
    let converted = convert_named(&tree, target, name)?;

    match &output {
        Some(path) => {
            std::fs::write(path, &converted)?;
            eprintln!(
                "{} {} -> {}",
                style("Converted").green().bold(),
                target,
                path.display()
            );
        }
        None => print!("{converted}"),
    }
    Ok(())
}
