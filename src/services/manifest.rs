/// HLS master playlist generation
///
/// The master playlist lists one variant stream per collected rendition,
/// highest resolution first, so players start from the best rung of the
/// ladder and adapt down.
use crate::models::VariantSpec;

/// Convert an ffmpeg-style bitrate ("2800k", "2M", "800000") to bits per
/// second. Returns 0 for unparseable input.
pub fn bitrate_bps(bitrate: &str) -> u64 {
    let trimmed = bitrate.trim();
    let (digits, multiplier) = match trimmed.char_indices().last() {
        Some((idx, 'k')) | Some((idx, 'K')) => (&trimmed[..idx], 1_000),
        Some((idx, 'm')) | Some((idx, 'M')) => (&trimmed[..idx], 1_000_000),
        _ => (trimmed, 1),
    };
    digits.parse::<u64>().map(|v| v * multiplier).unwrap_or(0)
}

/// Render the master playlist for the collected variants. Each entry is a
/// `(spec, relative playlist path)` pair; entries are emitted ordered by
/// height descending.
pub fn master_playlist(collected: &[(VariantSpec, String)]) -> String {
    let mut entries: Vec<&(VariantSpec, String)> = collected.iter().collect();
    entries.sort_by(|a, b| b.0.height.cmp(&a.0.height));

    let mut playlist = String::from("#EXTM3U\n");
    playlist.push_str("#EXT-X-VERSION:3\n");

    for (spec, playlist_path) in entries {
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{},NAME=\"{}\"\n",
            bitrate_bps(&spec.video_bitrate),
            spec.height,
            spec.height,
            spec.label
        ));
        playlist.push_str(playlist_path);
        playlist.push('\n');
    }

    playlist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collected() -> Vec<(VariantSpec, String)> {
        vec![
            (
                VariantSpec::new("360p", 360, "800k", "96k"),
                "360p/playlist.m3u8".to_string(),
            ),
            (
                VariantSpec::new("720p", 720, "2800k", "128k"),
                "720p/playlist.m3u8".to_string(),
            ),
            (
                VariantSpec::new("480p", 480, "1400k", "128k"),
                "480p/playlist.m3u8".to_string(),
            ),
        ]
    }

    #[test]
    fn test_bitrate_parsing() {
        assert_eq!(bitrate_bps("2800k"), 2_800_000);
        assert_eq!(bitrate_bps("96K"), 96_000);
        assert_eq!(bitrate_bps("2M"), 2_000_000);
        assert_eq!(bitrate_bps("800000"), 800_000);
        assert_eq!(bitrate_bps("garbage"), 0);
    }

    #[test]
    fn test_master_playlist_orders_by_height_descending() {
        let playlist = master_playlist(&collected());
        let lines: Vec<&str> = playlist.lines().collect();

        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXT-X-VERSION:3");
        assert_eq!(
            lines[2],
            "#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=720x720,NAME=\"720p\""
        );
        assert_eq!(lines[3], "720p/playlist.m3u8");
        assert_eq!(
            lines[4],
            "#EXT-X-STREAM-INF:BANDWIDTH=1400000,RESOLUTION=480x480,NAME=\"480p\""
        );
        assert_eq!(lines[5], "480p/playlist.m3u8");
        assert_eq!(
            lines[6],
            "#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=360x360,NAME=\"360p\""
        );
        assert_eq!(lines[7], "360p/playlist.m3u8");
    }

    #[test]
    fn test_single_variant_playlist() {
        let single = vec![(
            VariantSpec::new("480p", 480, "1400k", "128k"),
            "480p/playlist.m3u8".to_string(),
        )];
        let playlist = master_playlist(&single);

        assert_eq!(playlist.matches("#EXT-X-STREAM-INF").count(), 1);
        assert!(playlist.contains("BANDWIDTH=1400000"));
        assert!(playlist.ends_with("480p/playlist.m3u8\n"));
    }
}
