//! Terminal output helpers for the CLI
//!
//! Styled with `console` when stdout is a terminal, plain otherwise so that
//! piped output and CI logs stay readable.

mod context;
mod output;

pub use context::UiContext;
pub use output::{heading, key_value, remark, step_info, step_ok, step_ok_detail, step_warn_hint};
