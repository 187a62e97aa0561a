//! `gw-wire` — the stable binary format.
//!
//! Everything that leaves a simulator process goes through this crate: the
//! TCP protocol messages, the connection handshake, and save files.  The
//! format is little-endian and fixed-width; lengths precede variable-length
//! arrays except where both sides can derive the length from the
//! configuration exchanged at handshake (scent, vision, and per-type
//! arrays).  Floats are IEEE-754 binary32; the diffusion table is never
//! serialized (it is rebuilt from the config).
//!
//! | Module        | Contents                                              |
//! |---------------|-------------------------------------------------------|
//! | [`codec`]     | Primitive readers/writers and compound-type codecs    |
//! | [`messages`]  | `Request`/`Response` framing with numeric tags        |
//! | [`handshake`] | The three connection-setup frames                     |
//! | [`save`]      | Save-file writer/loader (magic, version, image)       |

pub mod codec;
pub mod handshake;
pub mod messages;
pub mod save;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use codec::DecodeError;
pub use handshake::{ClientIntro, ServerHello};
pub use messages::{Request, Response};
pub use save::{load, save};
