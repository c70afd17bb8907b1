//! PlantUML text encoding: diagram source → URL-safe token.
//!
//! PlantUML servers accept the diagram inline in the URL path: the UTF-8 text
//! is compressed with raw DEFLATE and written in a base64 variant whose
//! alphabet is `0-9A-Za-z-_`. Trailing groups are zero-filled to four
//! characters rather than `=`-padded.

use base64::alphabet::Alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use base64::Engine as _;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Write};
use tracing::debug;

const PLANTUML_ALPHABET: Alphabet =
    match Alphabet::new("0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_") {
        Ok(a) => a,
        Err(_) => panic!("invalid PlantUML alphabet"),
    };

const PLANTUML_ENGINE: GeneralPurpose = GeneralPurpose::new(&PLANTUML_ALPHABET, NO_PAD);

/// Encode diagram text for a `{server}/svg/{token}` URL.
pub fn encode_diagram(source: &str) -> io::Result<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(source.as_bytes())?;
    let compressed = encoder.finish()?;

    let mut token = PLANTUML_ENGINE.encode(&compressed);
    while token.len() % 4 != 0 {
        token.push('0');
    }
    debug!(
        "Encoded PlantUML diagram: {} bytes → {} chars",
        source.len(),
        token.len()
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    fn deflate(src: &str) -> Vec<u8> {
        let mut e = DeflateEncoder::new(Vec::new(), Compression::best());
        e.write_all(src.as_bytes()).unwrap();
        e.finish().unwrap()
    }

    #[test]
    fn token_uses_url_safe_alphabet() {
        let token = encode_diagram("@startuml\nBob -> Alice : hello\n@enduml").unwrap();
        assert!(!token.is_empty());
        assert_eq!(token.len() % 4, 0);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn token_decodes_back() {
        let src = "@startuml\nA -> B\n@enduml";
        let token = encode_diagram(src).unwrap();
        let canonical = PLANTUML_ENGINE.encode(deflate(src));
        assert!(token.starts_with(&canonical));
        assert!(token[canonical.len()..].chars().all(|c| c == '0'));

        let bytes = PLANTUML_ENGINE.decode(&canonical).unwrap();
        let mut out = String::new();
        DeflateDecoder::new(&bytes[..])
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode_diagram("@startuml\nX\n@enduml").unwrap();
        let b = encode_diagram("@startuml\nX\n@enduml").unwrap();
        assert_eq!(a, b);
    }
}
