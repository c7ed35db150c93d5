use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
    Unsupported,
}

/// A target container/format the service knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Mp4,
    Avi,
    Mov,
    Mkv,
    Mp3,
    Wav,
    Flac,
    Aac,
    Jpg,
    Jpeg,
    Png,
    Gif,
    Webp,
}

pub const VIDEO_FORMATS: [Format; 4] = [Format::Mp4, Format::Avi, Format::Mov, Format::Mkv];
pub const AUDIO_FORMATS: [Format; 4] = [Format::Mp3, Format::Wav, Format::Flac, Format::Aac];
pub const IMAGE_FORMATS: [Format; 5] = [
    Format::Jpg,
    Format::Jpeg,
    Format::Png,
    Format::Gif,
    Format::Webp,
];

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Mp4 => "mp4",
            Format::Avi => "avi",
            Format::Mov => "mov",
            Format::Mkv => "mkv",
            Format::Mp3 => "mp3",
            Format::Wav => "wav",
            Format::Flac => "flac",
            Format::Aac => "aac",
            Format::Jpg => "jpg",
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::Webp => "webp",
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Format::Mp4 | Format::Avi | Format::Mov | Format::Mkv => MediaKind::Video,
            Format::Mp3 | Format::Wav | Format::Flac | Format::Aac => MediaKind::Audio,
            Format::Jpg | Format::Jpeg | Format::Png | Format::Gif | Format::Webp => {
                MediaKind::Image
            }
        }
    }

    pub fn all() -> impl Iterator<Item = Format> {
        VIDEO_FORMATS
            .into_iter()
            .chain(AUDIO_FORMATS)
            .chain(IMAGE_FORMATS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedFormat(pub String);

impl fmt::Display for UnsupportedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported format: {}", self.0)
    }
}

impl std::error::Error for UnsupportedFormat {}

impl FromStr for Format {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();

        Format::all()
            .find(|format| format.extension() == lowered)
            .ok_or_else(|| UnsupportedFormat(s.to_owned()))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl Serialize for Format {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.extension())
    }
}

/// Classifies a bare file extension (no leading dot).
pub fn classify(extension: &str) -> MediaKind {
    extension
        .parse::<Format>()
        .map(|format| format.kind())
        .unwrap_or(MediaKind::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_category() {
        for ext in ["mp4", "avi", "mov", "mkv"] {
            assert_eq!(classify(ext), MediaKind::Video, "{ext}");
        }
        for ext in ["mp3", "wav", "flac", "aac"] {
            assert_eq!(classify(ext), MediaKind::Audio, "{ext}");
        }
        for ext in ["jpg", "jpeg", "png", "gif", "webp"] {
            assert_eq!(classify(ext), MediaKind::Image, "{ext}");
        }
    }

    #[test]
    fn classification_ignores_case() {
        assert_eq!(classify("MP4"), MediaKind::Video);
        assert_eq!(classify("Flac"), MediaKind::Audio);
        assert_eq!(classify("WebP"), MediaKind::Image);
    }

    #[test]
    fn unknown_extensions_are_unsupported() {
        assert_eq!(classify("webm"), MediaKind::Unsupported);
        assert_eq!(classify(""), MediaKind::Unsupported);
        assert_eq!(classify(".mp4"), MediaKind::Unsupported);
    }

    #[test]
    fn categories_are_disjoint() {
        let formats: Vec<Format> = Format::all().collect();
        assert_eq!(formats.len(), 13);

        for format in &formats {
            let hits = [
                VIDEO_FORMATS.contains(format),
                AUDIO_FORMATS.contains(format),
                IMAGE_FORMATS.contains(format),
            ]
            .iter()
            .filter(|hit| **hit)
            .count();
            assert_eq!(hits, 1, "{format} belongs to {hits} categories");
            assert_ne!(format.kind(), MediaKind::Unsupported);
        }
    }

    #[test]
    fn parse_round_trips_extension() {
        assert_eq!(" MKV ".parse::<Format>(), Ok(Format::Mkv));
        assert_eq!(
            "ogg".parse::<Format>(),
            Err(UnsupportedFormat("ogg".to_owned()))
        );
    }
}
