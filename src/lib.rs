// Library root
// ------------
// The binary (`main.rs`) wires these together; everything here can be
// driven without a network or a terminal.
//
// Module responsibilities:
// - `api`: authenticated blocking transport and the per-run `Session`.
// - `catalog`: one entry per platform operation, typed calls over `api`.
// - `outcome`: classifies flag-submission replies.
// - `router`: verb/alias table, tokens -> `Invocation`, arity checks.
// - `dispatch`: runs a routed command, including the release arena flow.
// - `render`: the views handed to presentation; `ui` draws them.
// - `config`, `cli`: token resolution and global options.
pub mod api;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod model;
pub mod outcome;
pub mod render;
pub mod router;
pub mod ui;

#[cfg(test)]
pub(crate) mod test_support;
