use crate::{Segment, Video};

/// Question sent when the user asks for a summary instead of typing one
pub const SUMMARY_QUESTION: &str = "Summarize this video. Provide a clear, structured summary that captures the key \
points, main arguments, and important details. Use bullet points for key takeaways.";

/// Build the context block describing a video for the chat model
pub fn build_context(video: &Video, segments: &[Segment]) -> String {
    let mut context = format!("Video title: {}\nVideo description: {}", video.title, video.description);

    if !segments.is_empty() {
        let transcript = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        context.push_str("\n\nTranscript:\n");
        context.push_str(&transcript);
    }

    context
}

/// Single-turn prompt: context plus the user's latest question, nothing else
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant answering questions about a YouTube video.\n\n{context}\n\nQuestion: {}",
        question.trim()
    )
}
