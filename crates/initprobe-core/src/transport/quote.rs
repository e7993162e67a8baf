//! Shell quoting for command lines sent to the target.
//!
//! Every value interpolated into a remote command line goes through
//! [`quote`]. Task names, paths and notify strings may contain spaces,
//! quotes, `$` or backticks; single-quoting them keeps the remote shell from
//! interpreting any of it.

use std::borrow::Cow;
use std::path::Path;

use shell_escape::unix::escape;

/// Quotes a single shell word.
///
/// Words made only of safe characters are returned unchanged, so command
/// lines stay readable in logs.
#[must_use]
pub fn quote(word: &str) -> String {
    escape(Cow::Borrowed(word)).into_owned()
}

/// Quotes a path as a single shell word.
#[must_use]
pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// Wraps a script so it runs under `sh -c`.
///
/// Needed wherever the script must survive a program boundary intact, for
/// example behind `sudo`, which would otherwise run only its first word.
#[must_use]
pub fn sh_c(script: &str) -> String {
    format!("sh -c {}", quote(script))
}
