use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, ClipForgeError};
use super::{GladiaClient, TranscriptionResult, Utterance};

/// Poll response envelope: `status` is queued/processing, "done", or
/// "error".
#[derive(Debug, Deserialize)]
struct PollResponse {
    status: String,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// Poll a submitted job at the configured interval until it completes,
/// errors, or the hard time ceiling is hit.
pub(super) async fn poll_until_complete(
    client: &GladiaClient,
    job_id: &str,
) -> Result<TranscriptionResult> {
    let interval = Duration::from_secs(client.config.poll_interval_secs);
    let deadline = Instant::now() + Duration::from_secs(client.config.poll_timeout_secs);
    let url = format!(
        "{}/pre-recorded/{}",
        client.config.endpoint.trim_end_matches('/'),
        job_id
    );

    info!("Polling transcription job {}", job_id);
    loop {
        let response = client
            .client
            .get(&url)
            .header("x-gladia-key", &client.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClipForgeError::Transcription(format!(
                "Poll failed with {}: {}",
                status, body
            )));
        }

        let poll: PollResponse = response.json().await?;
        match poll.status.as_str() {
            "done" => {
                info!("Transcription job {} completed", job_id);
                let result = poll.result.ok_or_else(|| {
                    ClipForgeError::Transcription(
                        "Job reported done but result field is missing".to_string(),
                    )
                })?;
                return parse_result(result);
            }
            "error" => {
                return Err(ClipForgeError::Transcription(format!(
                    "Transcription job {} failed: {}",
                    job_id,
                    poll.error.unwrap_or_else(|| "unknown error".to_string())
                )));
            }
            other => {
                debug!("Job {} still {}", job_id, other);
            }
        }

        if Instant::now() + interval > deadline {
            return Err(ClipForgeError::TranscriptionTimeout(
                client.config.poll_timeout_secs,
            ));
        }
        tokio::time::sleep(interval).await;
    }
}

/// Extract the transcript text and utterance list from the raw structured
/// result. A missing transcript field is a hard failure for the file.
fn parse_result(raw: serde_json::Value) -> Result<TranscriptionResult> {
    let transcription = raw.get("transcription").ok_or_else(|| {
        ClipForgeError::Transcription("Result is missing the transcription field".to_string())
    })?;

    let full_transcript = transcription
        .get("full_transcript")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            ClipForgeError::Transcription("Result is missing full_transcript".to_string())
        })?
        .to_string();

    let utterances = transcription
        .get("utterances")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let text = item.get("text")?.as_str()?.to_string();
                    Some(Utterance {
                        speaker: item
                            .get("speaker")
                            .and_then(|s| s.as_u64())
                            .map(|s| s as u32),
                        start: item.get("start").and_then(|s| s.as_f64()).unwrap_or(0.0),
                        end: item.get("end").and_then(|s| s.as_f64()).unwrap_or(0.0),
                        text,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(TranscriptionResult {
        full_transcript,
        utterances,
        raw,
    })
}

/// Persist the raw structured transcription and the plain-text transcript as
/// sidecars next to the source audio file:
/// `{base}_transcription.json` and `{base}.txt`.
pub fn persist_sidecars(
    audio_path: &Path,
    result: &TranscriptionResult,
) -> Result<(PathBuf, PathBuf)> {
    let parent = audio_path.parent().ok_or_else(|| {
        ClipForgeError::Transcription("Audio file has no parent directory".to_string())
    })?;
    let base = audio_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ClipForgeError::Transcription("Invalid audio filename".to_string()))?;

    let json_path = parent.join(format!("{}_transcription.json", base));
    let txt_path = parent.join(format!("{}.txt", base));

    std::fs::write(&json_path, serde_json::to_string_pretty(&result.raw)?)?;
    std::fs::write(&txt_path, &result.full_transcript)?;

    info!(
        "Persisted transcription sidecars: {} and {}",
        json_path.display(),
        txt_path.display()
    );
    Ok((json_path, txt_path))
}

/// Read the transcript sidecars written by an earlier run, if both exist
/// next to the audio file. Returns the transcript text and the raw JSON
/// sidecar path.
pub fn read_sidecars(audio_path: &Path) -> Option<(String, PathBuf)> {
    let parent = audio_path.parent()?;
    let base = audio_path.file_stem()?.to_str()?;
    let txt = parent.join(format!("{}.txt", base));
    let raw = parent.join(format!("{}_transcription.json", base));
    if !txt.exists() || !raw.exists() {
        return None;
    }
    let text = std::fs::read_to_string(&txt).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    Some((text, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_result_extracts_transcript_and_utterances() {
        let raw = json!({
            "transcription": {
                "full_transcript": "Speaker 0: hello. Speaker 1: hi.",
                "utterances": [
                    {"speaker": 0, "start": 0.0, "end": 1.5, "text": "hello"},
                    {"speaker": 1, "start": 1.6, "end": 2.4, "text": "hi"}
                ]
            }
        });

        let result = parse_result(raw).unwrap();
        assert_eq!(result.full_transcript, "Speaker 0: hello. Speaker 1: hi.");
        assert_eq!(result.utterances.len(), 2);
        assert_eq!(result.utterances[0].speaker, Some(0));
        assert_eq!(result.utterances[1].text, "hi");
    }

    #[test]
    fn test_missing_transcript_field_is_hard_failure() {
        let raw = json!({"transcription": {"utterances": []}});
        assert!(matches!(
            parse_result(raw),
            Err(ClipForgeError::Transcription(_))
        ));

        let raw = json!({"summary": "no transcription key"});
        assert!(matches!(
            parse_result(raw),
            Err(ClipForgeError::Transcription(_))
        ));
    }

    #[test]
    fn test_sidecars_written_next_to_audio() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("MIC1.mp3");
        std::fs::write(&audio, b"mp3").unwrap();

        let result = TranscriptionResult {
            full_transcript: "Speaker 0: hello".to_string(),
            utterances: vec![],
            raw: json!({"transcription": {"full_transcript": "Speaker 0: hello"}}),
        };

        let (json_path, txt_path) = persist_sidecars(&audio, &result).unwrap();
        assert_eq!(json_path, dir.path().join("MIC1_transcription.json"));
        assert_eq!(txt_path, dir.path().join("MIC1.txt"));
        assert_eq!(
            std::fs::read_to_string(&txt_path).unwrap(),
            "Speaker 0: hello"
        );
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert!(saved.get("transcription").is_some());

        let (text, raw) = read_sidecars(&audio).unwrap();
        assert_eq!(text, "Speaker 0: hello");
        assert_eq!(raw, json_path);
    }

    #[test]
    fn test_read_sidecars_requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("MIC2.wav");
        std::fs::write(&audio, b"wav").unwrap();
        assert!(read_sidecars(&audio).is_none());

        std::fs::write(dir.path().join("MIC2.txt"), "Speaker 0: hi").unwrap();
        assert!(read_sidecars(&audio).is_none());

        std::fs::write(dir.path().join("MIC2_transcription.json"), "{}").unwrap();
        assert!(read_sidecars(&audio).is_some());
    }
}
