//! PTL Compiler Binary

use ptlc::cli::PtlCli;
use ptlc::TemplateError;
use std::process;

fn main() {
    let mut cli = PtlCli::new();
    match cli.run() {
        Ok(()) => {}
        Err(TemplateError::Io(e)) => {
            eprintln!("IO Error: {}", e);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
