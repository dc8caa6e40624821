use std::io::Write as _;
use std::process::{Command, Stdio};

use serde::Serialize;

use crate::app::pane::ContentPane;
use crate::error::ShareError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ShareRequest {
    pub title: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ShareRequest {
    /// Link to the pane's chapter, anchored under `base_url` when one is given.
    pub fn for_pane(pane: &ContentPane, course_title: &str, base_url: Option<&str>) -> Self {
        Self {
            title: pane.title(),
            text: course_title.to_owned(),
            url: base_url.map(|base| {
                format!("{}#chapter-{}", base.trim_end_matches('/'), pane.chapter_id())
            }),
        }
    }

    /// Plain-text form used when the request lands on the clipboard.
    pub fn to_clipboard_text(&self) -> String {
        let mut out = self.title.clone();
        for extra in [Some(self.text.as_str()), self.url.as_deref()]
            .into_iter()
            .flatten()
        {
            if !extra.trim().is_empty() {
                out.push('\n');
                out.push_str(extra);
            }
        }
        out
    }
}

pub trait SharePlatform {
    fn share(&self, request: &ShareRequest) -> Result<(), ShareError>;
}

pub trait Clipboard {
    fn copy(&self, text: &str) -> Result<(), ShareError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareOutcome {
    Shared,
    Copied,
    Failed,
}

/// Shares through the platform, falling back to the clipboard. A clipboard failure is
/// logged, not returned.
pub fn share_with_fallback(
    platform: &dyn SharePlatform,
    clipboard: &dyn Clipboard,
    request: &ShareRequest,
) -> ShareOutcome {
    match platform.share(request) {
        Ok(()) => return ShareOutcome::Shared,
        Err(err) => tracing::info!(%err, "share unavailable, copying to clipboard"),
    }
    match clipboard.copy(&request.to_clipboard_text()) {
        Ok(()) => ShareOutcome::Copied,
        Err(err) => {
            tracing::warn!(%err, "clipboard fallback failed");
            ShareOutcome::Failed
        }
    }
}

/// Terminals have no share sheet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSharePlatform;

impl SharePlatform for NoSharePlatform {
    fn share(&self, _request: &ShareRequest) -> Result<(), ShareError> {
        Err(ShareError::Unavailable)
    }
}

/// Pipes text into the first clipboard tool found on `PATH`.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    candidates: Vec<(String, Vec<String>)>,
}

impl Default for CommandClipboard {
    fn default() -> Self {
        Self::new([
            ("wl-copy", &[][..]),
            ("xclip", &["-selection", "clipboard"][..]),
            ("pbcopy", &[][..]),
        ])
    }
}

impl CommandClipboard {
    pub fn new<'a>(candidates: impl IntoIterator<Item = (&'a str, &'a [&'a str])>) -> Self {
        Self {
            candidates: candidates
                .into_iter()
                .map(|(program, args)| {
                    (
                        program.to_owned(),
                        args.iter().map(|a| (*a).to_owned()).collect(),
                    )
                })
                .collect(),
        }
    }
}

impl Clipboard for CommandClipboard {
    fn copy(&self, text: &str) -> Result<(), ShareError> {
        for (program, args) in &self.candidates {
            let mut child = match Command::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
            {
                Ok(child) => child,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(ShareError::Clipboard(format!("spawn {program}: {err}"))),
            };
            if let Some(mut stdin) = child.stdin.take()
                && let Err(err) = stdin.write_all(text.as_bytes())
            {
                drop(stdin);
                let _ = child.kill();
                let _ = child.wait();
                return Err(ShareError::Clipboard(format!("write to {program}: {err}")));
            }
            let status = child
                .wait()
                .map_err(|err| ShareError::Clipboard(format!("wait for {program}: {err}")))?;
            if !status.success() {
                return Err(ShareError::Clipboard(format!("{program} exited with {status}")));
            }
            tracing::debug!(program = %program, "copied to clipboard");
            return Ok(());
        }
        Err(ShareError::Clipboard("no clipboard tool found".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct Platform(Result<(), ShareError>);

    impl SharePlatform for Platform {
        fn share(&self, _request: &ShareRequest) -> Result<(), ShareError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct Recorder {
        fail: bool,
        copied: RefCell<Vec<String>>,
    }

    impl Clipboard for Recorder {
        fn copy(&self, text: &str) -> Result<(), ShareError> {
            if self.fail {
                return Err(ShareError::Clipboard("denied".to_owned()));
            }
            self.copied.borrow_mut().push(text.to_owned());
            Ok(())
        }
    }

    fn request() -> ShareRequest {
        ShareRequest {
            title: "Learning".to_owned(),
            text: "Chapter 3".to_owned(),
            url: Some("https://example.test/#chapter-3".to_owned()),
        }
    }

    #[test]
    fn platform_share_skips_clipboard() {
        let clipboard = Recorder::default();
        let outcome = share_with_fallback(&Platform(Ok(())), &clipboard, &request());
        assert_eq!(outcome, ShareOutcome::Shared);
        assert!(clipboard.copied.borrow().is_empty());
    }

    #[test]
    fn rejected_share_falls_back_to_clipboard() {
        let clipboard = Recorder::default();
        let outcome = share_with_fallback(
            &Platform(Err(ShareError::Rejected("cancelled".to_owned()))),
            &clipboard,
            &request(),
        );
        assert_eq!(outcome, ShareOutcome::Copied);
        assert_eq!(
            *clipboard.copied.borrow(),
            vec!["Learning\nChapter 3\nhttps://example.test/#chapter-3".to_owned()]
        );
    }

    #[test]
    fn clipboard_failure_is_reported_as_failed_outcome() {
        let clipboard = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let outcome = share_with_fallback(&NoSharePlatform, &clipboard, &request());
        assert_eq!(outcome, ShareOutcome::Failed);
    }

    #[cfg(unix)]
    #[test]
    fn tool_that_closes_stdin_is_reaped_with_an_error() {
        // `true` exits without reading; a large write then hits a closed pipe.
        let clipboard = CommandClipboard::new([("true", &[][..])]);
        let text = "x".repeat(1 << 20);
        assert!(matches!(
            clipboard.copy(&text),
            Err(ShareError::Clipboard(msg)) if msg.starts_with("write to true")
        ));
    }

    #[test]
    fn missing_tools_yield_clipboard_error() {
        let clipboard = CommandClipboard::new([("coursemap-no-such-clipboard-tool", &[][..])]);
        assert!(matches!(
            clipboard.copy("text"),
            Err(ShareError::Clipboard(_))
        ));
    }
}
