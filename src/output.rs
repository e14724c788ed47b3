use eyre::Result;

use crate::{Segment, Video, format_time};

/// Render segments as plain text (one segment per line, no timestamps)
pub fn render_text(segments: &[Segment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join("\n")
}

/// Render one segment as `[MM:SS] text`
pub fn timed_line(segment: &Segment) -> String {
    format!("[{}] {}", format_time(segment.start), segment.text)
}

/// Render segments as `[MM:SS] text` lines
pub fn render_timed(segments: &[Segment]) -> String {
    segments.iter().map(timed_line).collect::<Vec<_>>().join("\n")
}

pub fn render_json(video_id: &str, segments: &[Segment]) -> Result<String> {
    let doc = serde_json::json!({
        "video_id": video_id,
        "segments": segments,
    });
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Render segments as SRT subtitles. Zero-duration segments run until the next one starts.
pub fn render_srt(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let end = if segment.duration > 0.0 {
            segment.start + segment.duration
        } else {
            segments
                .get(i + 1)
                .map(|next| next.start)
                .filter(|next| *next > segment.start)
                .unwrap_or(segment.start + 2.0)
        };
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_timestamp(segment.start),
            srt_timestamp(end),
            segment.text
        ));
    }
    out.trim_end().to_string()
}

fn srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (h, rem) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (m, rem) = (rem / 60_000, rem % 60_000);
    let (s, ms) = (rem / 1000, rem % 1000);
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// Plain-text notes export: video metadata, the notes, then the timed transcript
pub fn render_notes_export(video: &Video, notes: &str, segments: &[Segment]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Title: {}\n", video.title));
    out.push_str(&format!("URL: https://www.youtube.com/watch?v={}\n", video.id));
    if !video.description.is_empty() {
        out.push_str(&format!("Description: {}\n", video.description));
    }

    out.push_str("\nNotes:\n");
    if notes.trim().is_empty() {
        out.push_str("(none)\n");
    } else {
        out.push_str(notes.trim_end());
        out.push('\n');
    }

    out.push_str("\nTranscript:\n");
    if segments.is_empty() {
        out.push_str("(no transcript available)\n");
    } else {
        out.push_str(&render_timed(segments));
        out.push('\n');
    }
    out
}
