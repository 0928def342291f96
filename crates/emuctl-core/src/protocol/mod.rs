//! Line protocol: framing, tokenizing and reply/event formatting.
//!
//! Wire format:
//! ```text
//! client → host   <verb> [arg ...]\n          (arguments may be '…' or "…" quoted)
//! host → client   OK[ <message>]\n  |  ERR <message>\n
//! host → client   !<event> <fields...>\n      (unsolicited, at any time)
//! ```
//! The only exception to the all-text rule is `screenshot`, whose `OK` header
//! line is followed by a raw block of pixel bytes.

pub mod command;
pub mod line_buffer;
pub mod response;

pub use command::{tokenize, Command};
pub use line_buffer::{LineBuffer, DEFAULT_BUFFER_SIZE};
pub use response::{Frame, PushEvent, Reply, HELP_TEXT};
