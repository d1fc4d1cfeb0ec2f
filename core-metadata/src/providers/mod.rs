//! External artwork providers
//!
//! Each provider implements [`crate::remote::RemoteArtworkLookup`] and
//! handles its own rate limiting to comply with the service's terms.

#[cfg(feature = "artwork-remote")]
pub mod musicbrainz;

#[cfg(feature = "artwork-remote")]
pub use musicbrainz::MusicBrainzArtworkLookup;
