//! Output encoding negotiation.

use serde::{Deserialize, Serialize};

/// Encoding used when the host reports support for none of the preferences.
pub const FALLBACK_MIME_TYPE: &str = "video/webm";

/// Anything that can answer "can you record this MIME type?".
pub trait CodecSupport {
    fn is_type_supported(&self, mime_type: &str) -> bool;
}

impl<F> CodecSupport for F
where
    F: Fn(&str) -> bool,
{
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self(mime_type)
    }
}

/// The encoding picked for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedCodec {
    pub mime_type: String,

    /// True when nothing in the preference list was supported and the
    /// generic default was chosen; the recorder may still reject it.
    pub fallback: bool,
}

impl NegotiatedCodec {
    /// Container part of the MIME type, e.g. `video/webm` for `video/webm;codecs=vp9`.
    pub fn container(&self) -> &str {
        self.mime_type
            .split(';')
            .next()
            .map(str::trim)
            .unwrap_or(FALLBACK_MIME_TYPE)
    }

    /// File extension matching the container.
    pub fn file_extension(&self) -> &'static str {
        match self.container() {
            "video/mp4" => "mp4",
            "video/quicktime" => "mov",
            "video/x-matroska" => "mkv",
            _ => "webm",
        }
    }
}

/// Pick the first supported MIME type from `preferences`.
pub fn negotiate<S, P>(preferences: &[P], support: &S) -> NegotiatedCodec
where
    S: CodecSupport + ?Sized,
    P: AsRef<str>,
{
    for candidate in preferences {
        let candidate = candidate.as_ref();
        if support.is_type_supported(candidate) {
            tracing::debug!(mime_type = candidate, "Negotiated output codec");
            return NegotiatedCodec {
                mime_type: candidate.to_string(),
                fallback: false,
            };
        }
    }

    tracing::warn!(
        candidates = preferences.len(),
        fallback = FALLBACK_MIME_TYPE,
        "No preferred codec reported as supported; using fallback"
    );
    NegotiatedCodec {
        mime_type: FALLBACK_MIME_TYPE.to_string(),
        fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFS: [&str; 3] = [
        "video/webm;codecs=vp9,opus",
        "video/webm;codecs=vp8,opus",
        "video/webm",
    ];

    #[test]
    fn test_first_supported_wins() {
        let support = |m: &str| m.contains("vp8") || m == "video/webm";
        let codec = negotiate(&PREFS, &support);
        assert_eq!(codec.mime_type, "video/webm;codecs=vp8,opus");
        assert!(!codec.fallback);
    }

    #[test]
    fn test_fallback_when_nothing_supported() {
        let codec = negotiate(&PREFS, &|_: &str| false);
        assert_eq!(codec.mime_type, FALLBACK_MIME_TYPE);
        assert!(codec.fallback);
    }

    #[test]
    fn test_empty_preferences_fall_back() {
        let prefs: [&str; 0] = [];
        assert!(negotiate(&prefs, &|_: &str| true).fallback);
    }

    #[test]
    fn test_extension_from_container() {
        let codec = NegotiatedCodec {
            mime_type: "video/mp4; codecs=avc1".to_string(),
            fallback: false,
        };
        assert_eq!(codec.container(), "video/mp4");
        assert_eq!(codec.file_extension(), "mp4");
    }

    mod props {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn negotiated_type_is_first_supported_or_fallback(
                supported in proptest::collection::vec(any::<bool>(), 0..6)
            ) {
                let prefs: Vec<String> = (0..supported.len())
                    .map(|i| format!("video/webm;codecs=c{i}"))
                    .collect();
                let support = |m: &str| {
                    prefs.iter().position(|p| p == m).is_some_and(|i| supported[i])
                };
                let codec = negotiate(&prefs, &support);
                match supported.iter().position(|s| *s) {
                    Some(i) => {
                        prop_assert_eq!(&codec.mime_type, &prefs[i]);
                        prop_assert!(!codec.fallback);
                    }
                    None => {
                        prop_assert_eq!(codec.mime_type.as_str(), FALLBACK_MIME_TYPE);
                        prop_assert!(codec.fallback);
                    }
                }
            }
        }
    }
}
