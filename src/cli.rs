//! CLI domain: parse, route and output only.

mod output;
mod parse;
mod route;

pub use output::{map_error, render_json};
pub use parse::{parse_assignment, Cli, Commands};
pub use route::RunContext;
