//! CLI domain: parse, route, output, and presentation only.
//! Domain work lives in `workflow`; the route table wires it up.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{format_ensure_report, format_status_json, format_status_text};
pub use route::RunContext;
