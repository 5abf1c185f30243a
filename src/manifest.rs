//! Build-time asset manifest shared with the offline shell page.
//!
//! The paths here must match what the application shell links to, otherwise
//! the cached copies are never hit.

/// Name of the core namespace. Bump to invalidate the previous generation.
pub const CORE_CACHE_NAME: &str = "fitreport-core-v3";

/// Name of the audio namespace, versioned independently of the core one.
pub const AUDIO_CACHE_NAME: &str = "fitreport-audio-v1";

/// Path segment that routes a request to the audio namespace.
pub const AUDIO_MARKER: &str = "/audio/";

/// Document served when a navigation fails and nothing is cached for it.
pub const OFFLINE_DOCUMENT: &str = "/offline.html";

/// Shell documents, styles, scripts, icons and the web manifest.
pub const CORE_FILES: &[&str] = &[
    "/",
    "/index.html",
    "/offline.html",
    "/manifest.json",
    "/static/css/style.css",
    "/static/js/app.js",
    "/static/icons/icon-192.png",
    "/static/icons/icon-512.png",
];

/// Root of the voice-coach clips.
pub const AUDIO_ROOT: &str = "/audio/commander/";

/// Phase announcements played at interval boundaries.
pub const PHASE_CLIPS: &[&str] = &[
    "warmup",
    "start",
    "halfway",
    "last-minute",
    "cooldown",
    "finish",
];

/// Short coaching phrases.
pub const ENCOURAGEMENT_CLIPS: &[&str] = &[
    "keep-going",
    "push-harder",
    "great-job",
    "almost-there",
    "breathe",
];

/// Highest spoken number in the countdown clips.
pub const MAX_SPOKEN_NUMBER: u32 = 60;

/// Returns the core-files list as owned strings.
#[must_use]
pub fn core_files() -> Vec<String> {
    CORE_FILES.iter().map(ToString::to_string).collect()
}

/// Returns every audio clip path: phase cues, spoken numbers 1 through 60,
/// then encouragement clips.
#[must_use]
pub fn audio_files() -> Vec<String> {
    let phases = PHASE_CLIPS
        .iter()
        .map(|name| format!("{AUDIO_ROOT}phases/{name}.mp3"));
    let numbers = (1..=MAX_SPOKEN_NUMBER).map(|n| format!("{AUDIO_ROOT}numbers/{n}.mp3"));
    let encouragement = ENCOURAGEMENT_CLIPS
        .iter()
        .map(|name| format!("{AUDIO_ROOT}encouragement/{name}.mp3"));

    phases.chain(numbers).chain(encouragement).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn audio_manifest_has_every_clip_once() {
        let files = audio_files();
        assert_eq!(files.len(), 71);
        let unique: HashSet<_> = files.iter().collect();
        assert_eq!(unique.len(), files.len());
    }

    #[test]
    fn audio_manifest_is_under_marker() {
        for path in audio_files() {
            assert!(path.starts_with(AUDIO_ROOT), "{path}");
            assert!(path.contains(AUDIO_MARKER), "{path}");
        }
    }

    #[test]
    fn spoken_numbers_cover_one_to_sixty() {
        let files = audio_files();
        assert!(files.contains(&"/audio/commander/numbers/1.mp3".to_string()));
        assert!(files.contains(&"/audio/commander/numbers/60.mp3".to_string()));
        assert!(!files.contains(&"/audio/commander/numbers/0.mp3".to_string()));
        assert!(!files.contains(&"/audio/commander/numbers/61.mp3".to_string()));
    }

    #[test]
    fn core_manifest_includes_offline_document() {
        assert!(CORE_FILES.contains(&OFFLINE_DOCUMENT));
        assert!(CORE_FILES.iter().all(|p| !p.contains(AUDIO_MARKER)));
    }
}
