//! Reference pre-checks for request front-ends
//!
//! The pipeline itself accepts any string; these checks are for whoever
//! takes requests from users, so obviously unusable input never costs a
//! resolver run.

use crate::error::AddTrackError;

/// Query parameter marking a playlist link
const PLAYLIST_MARKER: &str = "list=";

/// True for links that point at a playlist rather than a single track
pub fn is_playlist(reference: &str) -> bool {
    reference.contains(PLAYLIST_MARKER)
}

fn has_web_scheme(reference: &str) -> bool {
    reference.starts_with("https://") || reference.starts_with("http://")
}

/// Validate a single-track reference, returning it trimmed
pub fn check_track_reference(reference: &str) -> Result<&str, AddTrackError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(AddTrackError::InvalidReference("empty reference".to_string()));
    }
    if is_playlist(reference) {
        return Err(AddTrackError::InvalidReference(format!(
            "{} is a playlist, add single tracks only",
            reference
        )));
    }
    Ok(reference)
}

/// Validate a party playlist reference, returning it trimmed
pub fn check_playlist_reference(reference: &str) -> Result<&str, AddTrackError> {
    let reference = reference.trim();
    if !has_web_scheme(reference) {
        return Err(AddTrackError::InvalidReference(format!(
            "{} is not a web link",
            reference
        )));
    }
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_reference_trimmed() {
        assert_eq!(
            check_track_reference("  https://youtu.be/abc \n").unwrap(),
            "https://youtu.be/abc"
        );
        assert_eq!(check_track_reference("/music/a.mp3").unwrap(), "/music/a.mp3");
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            check_track_reference("   "),
            Err(AddTrackError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_playlist_rejected_on_track_path() {
        let link = "https://www.youtube.com/watch?v=abc&list=PL123";
        assert!(is_playlist(link));
        assert!(check_track_reference(link).is_err());
        assert!(check_playlist_reference(link).is_ok());
    }

    #[test]
    fn test_playlist_needs_web_link() {
        assert!(check_playlist_reference("/music/party").is_err());
        assert!(check_playlist_reference("http://example.com/list").is_ok());
    }
}
