//! Platform history normalization.
//!
//! Turns the platform's newest-first message window into model-ready turns,
//! oldest first. Media items route through the analysis cache; a single
//! failing item is skipped, never fatal to the whole reconstruction.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::agent::cache::{MediaCache, MediaKind};
use crate::agent::error::AgentError;
use crate::agent::types::{
    ContentPart, ConversationContext, ConversationTurn, MediaPayload, MessageKind,
    PlatformMessage,
};
use crate::providers::{OcrProvider, PdfExtractor, Transcriber, VisionProvider};

/// The control token that wipes accumulated history.
pub const CLEAR_COMMAND: &str = "/clear";

/// Whether a message body invokes the clear command.
///
/// Prefix match, so trailing text ("/clear please") still counts. The
/// same predicate governs the live command and the in-history marker.
#[must_use]
pub fn is_clear_command(body: &str) -> bool {
    body.trim_start().starts_with(CLEAR_COMMAND)
}

/// Placeholder for documents the engine cannot read.
const OPAQUE_DOCUMENT: &str = "[Attached document]";

/// Converts raw platform messages into model turns.
pub struct HistoryNormalizer {
    cache: Arc<MediaCache>,
    transcriber: Arc<dyn Transcriber>,
    vision: Arc<dyn VisionProvider>,
    ocr: Option<Arc<dyn OcrProvider>>,
    pdf: Option<Arc<dyn PdfExtractor>>,
}

impl HistoryNormalizer {
    /// Create a normalizer. OCR and PDF extraction are optional; without
    /// them images lose their text overlay and PDFs become opaque.
    #[must_use]
    pub fn new(
        cache: Arc<MediaCache>,
        transcriber: Arc<dyn Transcriber>,
        vision: Arc<dyn VisionProvider>,
        ocr: Option<Arc<dyn OcrProvider>>,
        pdf: Option<Arc<dyn PdfExtractor>>,
    ) -> Self {
        Self {
            cache,
            transcriber,
            vision,
            ocr,
            pdf,
        }
    }

    /// Normalize a newest-first message window into chronological turns.
    ///
    /// A `/clear` marker anywhere in the scanned window resets the turns
    /// accumulated so far and scanning continues, so only messages after
    /// the most recent marker contribute. Unsupported message kinds and
    /// messages that fail to process are skipped.
    pub async fn normalize(
        &self,
        messages: &[PlatformMessage],
        ctx: &ConversationContext,
    ) -> Vec<ConversationTurn> {
        let mut turns = Vec::new();
        // Platform APIs return newest first; dialogue coherence requires
        // oldest first.
        for message in messages.iter().rev() {
            if is_clear_command(&message.body) {
                turns.clear();
                continue;
            }
            match self.normalize_message(message, ctx).await {
                Ok(Some(turn)) => turns.push(turn),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("skipping unprocessable history item {}: {e}", message.id);
                }
            }
        }
        turns
    }

    async fn normalize_message(
        &self,
        message: &PlatformMessage,
        ctx: &ConversationContext,
    ) -> Result<Option<ConversationTurn>, AgentError> {
        if message.from_me {
            return Ok(Some(ConversationTurn::assistant(message.body.clone())));
        }
        if message.kind.is_unsupported() {
            return Ok(None);
        }

        let mut parts = match message.kind {
            MessageKind::Text => {
                if message.body.is_empty() {
                    return Ok(None);
                }
                vec![ContentPart::Text(message.body.clone())]
            }
            MessageKind::Voice | MessageKind::Audio => {
                let media = require_media(message)?;
                let transcript = self.transcript(&media.data).await?;
                vec![ContentPart::Text(transcript)]
            }
            MessageKind::Image | MessageKind::Sticker => {
                let media = require_media(message)?;
                self.image_parts(message, media).await?
            }
            MessageKind::Document => {
                let media = require_media(message)?;
                vec![ContentPart::Text(self.document_text(message, media).await)]
            }
            MessageKind::Call
            | MessageKind::Video
            | MessageKind::Location
            | MessageKind::GroupInvite => return Ok(None),
        };

        // Group turns carry an author marker the model is instructed never
        // to echo back.
        if ctx.is_group {
            parts.insert(0, ContentPart::Text(format!("[{}]", message.sender)));
        }
        Ok(Some(ConversationTurn::user(parts)))
    }

    /// Caption, cached description, then the inline image itself.
    async fn image_parts(
        &self,
        message: &PlatformMessage,
        media: &MediaPayload,
    ) -> Result<Vec<ContentPart>, AgentError> {
        let locator = data_url(media);
        let description = self.describe(&locator).await?;
        let mut parts = Vec::new();
        if !message.body.is_empty() {
            parts.push(ContentPart::Text(message.body.clone()));
        }
        parts.push(ContentPart::Text(format!("[Image: {description}]")));
        parts.push(ContentPart::Image { url: locator });
        Ok(parts)
    }

    async fn document_text(&self, message: &PlatformMessage, media: &MediaPayload) -> String {
        if media.mime_type == "application/pdf" {
            if let Some(pdf) = &self.pdf {
                match pdf.extract_text(&media.data).await {
                    Ok(text) => {
                        return if message.body.is_empty() {
                            format!("[PDF: {text}]")
                        } else {
                            format!("[PDF: {text}] {}", message.body)
                        };
                    }
                    Err(e) => {
                        tracing::warn!("PDF extraction failed: {e}");
                    }
                }
            }
        }
        OPAQUE_DOCUMENT.to_string()
    }

    /// Speech-to-text through the analysis cache.
    async fn transcript(&self, audio: &[u8]) -> Result<String, AgentError> {
        if let Some(cached) = self.cache.lookup(audio, MediaKind::Transcription) {
            tracing::debug!("transcription cache hit");
            return Ok(cached);
        }
        let transcript = self.transcriber.transcribe(audio).await?;
        self.cache
            .store(audio, MediaKind::Transcription, transcript.clone());
        Ok(transcript)
    }

    /// Vision description (merged with OCR text when available) through
    /// the analysis cache, keyed by the resolved locator.
    async fn describe(&self, locator: &str) -> Result<String, AgentError> {
        if let Some(cached) = self.cache.lookup(locator.as_bytes(), MediaKind::Image) {
            tracing::debug!("vision cache hit");
            return Ok(cached);
        }

        let description = self.vision.describe(locator).await?;
        let combined = match &self.ocr {
            Some(ocr) => match ocr.extract_text(locator).await {
                Ok(text) if !text.trim().is_empty() => {
                    if description.is_empty() {
                        text.trim().to_string()
                    } else {
                        format!("{description}\n\n{}", text.trim())
                    }
                }
                Ok(_) => description,
                Err(e) => {
                    tracing::warn!("OCR failed, keeping description only: {e}");
                    description
                }
            },
            None => description,
        };

        self.cache
            .store(locator.as_bytes(), MediaKind::Image, combined.clone());
        Ok(combined)
    }
}

fn require_media(message: &PlatformMessage) -> Result<&MediaPayload, AgentError> {
    message
        .media
        .as_ref()
        .ok_or_else(|| AgentError::Media(format!("message {} has no media payload", message.id)))
}

/// Inline `data:` URL for a media payload.
fn data_url(media: &MediaPayload) -> String {
    format!(
        "data:{};base64,{}",
        media.mime_type,
        BASE64.encode(&media.data)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::config::MediaCacheConfig;
    use crate::agent::types::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTranscriber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transcriber for CountingTranscriber {
        async fn transcribe(&self, _audio: &[u8]) -> Result<String, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("hello from voice".to_string())
        }
    }

    struct StubVision;

    #[async_trait]
    impl VisionProvider for StubVision {
        async fn describe(&self, _image_ref: &str) -> Result<String, AgentError> {
            Ok("a red bicycle".to_string())
        }
    }

    struct StubOcr;

    #[async_trait]
    impl OcrProvider for StubOcr {
        async fn extract_text(&self, _image_ref: &str) -> Result<String, AgentError> {
            Ok("SALE 50%".to_string())
        }
    }

    struct FailingTranscriber;

    #[async_trait]
    impl Transcriber for FailingTranscriber {
        async fn transcribe(&self, _audio: &[u8]) -> Result<String, AgentError> {
            Err(AgentError::Media("download failed".to_string()))
        }
    }

    fn normalizer_with(
        transcriber: Arc<dyn Transcriber>,
        ocr: Option<Arc<dyn OcrProvider>>,
    ) -> (HistoryNormalizer, Arc<MediaCache>) {
        let cache = Arc::new(MediaCache::new(MediaCacheConfig::default()));
        let normalizer = HistoryNormalizer::new(
            Arc::clone(&cache),
            transcriber,
            Arc::new(StubVision),
            ocr,
            None,
        );
        (normalizer, cache)
    }

    fn direct_ctx() -> ConversationContext {
        ConversationContext {
            conversation_id: "conv".to_string(),
            is_group: false,
        }
    }

    fn text_message(body: &str) -> PlatformMessage {
        PlatformMessage::text("conv", "+15551234567", body)
    }

    fn voice_message(bytes: &[u8]) -> PlatformMessage {
        PlatformMessage {
            kind: MessageKind::Voice,
            media: Some(MediaPayload {
                data: bytes.to_vec(),
                mime_type: "audio/ogg".to_string(),
            }),
            ..text_message("")
        }
    }

    #[tokio::test]
    async fn test_newest_first_input_yields_chronological_turns() {
        let (normalizer, _) = normalizer_with(Arc::new(CountingTranscriber::default()), None);
        // Platform order: newest first.
        let messages = vec![text_message("third"), text_message("second"), {
            let mut m = text_message("first");
            m.from_me = true;
            m
        }];
        let turns = normalizer.normalize(&messages, &direct_ctx()).await;

        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::Assistant);
        assert_eq!(turns[0].text(), "first");
        assert_eq!(turns[1].text(), "second");
        assert_eq!(turns[2].text(), "third");
    }

    #[tokio::test]
    async fn test_clear_marker_truncates_accumulated_turns() {
        let (normalizer, _) = normalizer_with(Arc::new(CountingTranscriber::default()), None);
        // Chronological [A, /clear, B, C] arrives newest first.
        let messages = vec![
            text_message("C"),
            text_message("B"),
            text_message("/clear"),
            text_message("A"),
        ];
        let turns = normalizer.normalize(&messages, &direct_ctx()).await;

        let texts: Vec<String> = turns.iter().map(ConversationTurn::text).collect();
        assert_eq!(texts, vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_clear_command_is_a_prefix_match() {
        assert!(is_clear_command("/clear"));
        assert!(is_clear_command("  /clear please"));
        assert!(!is_clear_command("clear"));
        assert!(!is_clear_command("please /clear"));
    }

    #[tokio::test]
    async fn test_group_turns_get_author_marker() {
        let (normalizer, _) = normalizer_with(Arc::new(CountingTranscriber::default()), None);
        let ctx = ConversationContext {
            conversation_id: "group".to_string(),
            is_group: true,
        };
        let turns = normalizer.normalize(&[text_message("hola")], &ctx).await;

        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text(), "[+15551234567] hola");
    }

    #[tokio::test]
    async fn test_voice_transcript_is_cached_by_content() {
        let transcriber = Arc::new(CountingTranscriber::default());
        let (normalizer, cache) =
            normalizer_with(Arc::clone(&transcriber) as Arc<dyn Transcriber>, None);

        let first = normalizer
            .normalize(&[voice_message(b"opus-bytes")], &direct_ctx())
            .await;
        assert_eq!(first[0].text(), "hello from voice");
        assert_eq!(
            cache.lookup(b"opus-bytes", MediaKind::Transcription),
            Some("hello from voice".to_string())
        );

        // Byte-identical voice note: served from cache, no second call.
        normalizer
            .normalize(&[voice_message(b"opus-bytes")], &direct_ctx())
            .await;
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_item_is_skipped_not_fatal() {
        let (normalizer, _) = normalizer_with(Arc::new(FailingTranscriber), None);
        let messages = vec![text_message("after"), voice_message(b"bad"), {
            let mut m = text_message("before");
            m.from_me = true;
            m
        }];
        let turns = normalizer.normalize(&messages, &direct_ctx()).await;

        let texts: Vec<String> = turns.iter().map(ConversationTurn::text).collect();
        assert_eq!(texts, vec!["before".to_string(), "after".to_string()]);
    }

    #[tokio::test]
    async fn test_image_description_merges_ocr() {
        let (normalizer, _) = normalizer_with(
            Arc::new(CountingTranscriber::default()),
            Some(Arc::new(StubOcr)),
        );
        let message = PlatformMessage {
            kind: MessageKind::Image,
            body: "look at this".to_string(),
            media: Some(MediaPayload {
                data: vec![1, 2, 3],
                mime_type: "image/png".to_string(),
            }),
            ..text_message("")
        };
        let turns = normalizer.normalize(&[message], &direct_ctx()).await;

        assert_eq!(turns.len(), 1);
        let text = turns[0].text();
        assert!(text.contains("look at this"));
        assert!(text.contains("a red bicycle"));
        assert!(text.contains("SALE 50%"));
        assert!(matches!(
            turns[0].content.last(),
            Some(ContentPart::Image { url }) if url.starts_with("data:image/png;base64,")
        ));
    }

    #[tokio::test]
    async fn test_sticker_is_described_like_an_image() {
        let (normalizer, cache) =
            normalizer_with(Arc::new(CountingTranscriber::default()), None);
        let message = PlatformMessage {
            kind: MessageKind::Sticker,
            media: Some(MediaPayload {
                data: vec![9, 9],
                mime_type: "image/webp".to_string(),
            }),
            ..text_message("")
        };
        let turns = normalizer.normalize(&[message], &direct_ctx()).await;

        assert!(turns[0].text().contains("a red bicycle"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_kinds_are_not_appended() {
        let (normalizer, _) = normalizer_with(Arc::new(CountingTranscriber::default()), None);
        let call = PlatformMessage {
            kind: MessageKind::Call,
            ..text_message("")
        };
        let turns = normalizer
            .normalize(&[text_message("hi"), call], &direct_ctx())
            .await;
        assert_eq!(turns.len(), 1);
    }

    #[tokio::test]
    async fn test_non_pdf_document_is_opaque() {
        let (normalizer, _) = normalizer_with(Arc::new(CountingTranscriber::default()), None);
        let message = PlatformMessage {
            kind: MessageKind::Document,
            media: Some(MediaPayload {
                data: vec![0; 4],
                mime_type: "application/zip".to_string(),
            }),
            ..text_message("")
        };
        let turns = normalizer.normalize(&[message], &direct_ctx()).await;
        assert_eq!(turns[0].text(), OPAQUE_DOCUMENT);
    }
}
