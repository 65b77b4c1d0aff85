//! Walk an MBOX archive and extract the attachments of every message.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{MboxError, Result};
use crate::model::message::MailMessage;
use crate::model::part::Part;
use crate::parser::mime::parse_message;
use crate::store::reader::MboxArchive;

use super::attachment::{save_part, Category, ExtractionState};
use super::classify::{classify, PartAction};

/// Default maximum message size in bytes (256 MB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Everything one extraction run needs to know.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Save `image/*` parts that are not attachments into `inline_folder`.
    pub inline_images: bool,
    pub inline_folder: String,
    /// First message index to process.
    pub start: u64,
    /// Index to stop before. `None` runs to the end of the archive.
    pub stop: Option<u64>,
    /// Case-insensitive substring the raw `From:` header must contain.
    pub sender: Option<String>,
    /// Case-insensitive substring the raw `To:` header must contain.
    pub recipient: Option<String>,
    pub guess_extensions: bool,
    /// Log a progress line every this many message indexes.
    pub progress_interval: u64,
    pub read_buffer_size: Option<usize>,
    pub max_message_size: usize,
}

impl ExtractOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            inline_images: true,
            inline_folder: "inline_images".to_string(),
            start: 0,
            stop: None,
            sender: None,
            recipient: None,
            guess_extensions: false,
            progress_interval: 1000,
            read_buffer_size: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Options seeded from the `[extract]` and `[performance]` config sections.
    pub fn from_config(
        config: &Config,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inline_images: config.extract.inline_images,
            inline_folder: config.extract.inline_folder.clone(),
            guess_extensions: config.extract.guess_extensions,
            progress_interval: config.extract.progress_interval,
            read_buffer_size: Some(config.performance.read_buffer_size),
            max_message_size: config.performance.max_message_size,
            ..Self::new(input, output)
        }
    }
}

/// A part that could not be saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartFailure {
    /// Archive index of the message.
    pub message: u64,
    /// Label of the part within its message (`"2"`, `"ii1"`).
    pub label: String,
    pub error: String,
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    /// Parts an extraction was attempted for.
    pub total: u64,
    pub failed: u64,
    pub bytes_written: u64,
    /// Parts written under the short `"<index> <label><ext>"` name because
    /// the decoded name was too long for the file system.
    pub shortened: u64,
    pub failures: Vec<PartFailure>,
}

/// Outcome of [`Extractor::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub totals: RunTotals,
    /// Messages read from the archive (filtered ones included).
    pub messages_seen: u64,
    /// Messages left out by the sender/recipient filters.
    pub messages_filtered: u64,
    /// Messages the MIME parser rejected.
    pub messages_unparsed: u64,
    /// The run stopped because the archive had no more messages.
    pub exhausted: bool,
    /// The run stopped early because the archive could not be read.
    pub read_error: Option<String>,
}

/// Extraction driver for one archive.
pub struct Extractor {
    options: ExtractOptions,
    archive: MboxArchive,
    inline_dir: Option<PathBuf>,
}

impl Extractor {
    /// Open the archive and prepare the output folders.
    ///
    /// The archive is checked before anything is created, so a wrong input
    /// path leaves the file system untouched. `scan_progress` receives
    /// `(bytes_scanned, file_size)` while message boundaries are located.
    pub fn open(options: ExtractOptions, scan_progress: Option<&dyn Fn(u64, u64)>) -> Result<Self> {
        let archive = MboxArchive::open_with(
            &options.input,
            options.read_buffer_size,
            options.max_message_size,
            scan_progress,
        )?;

        if options.output.exists() && !options.output.is_dir() {
            return Err(MboxError::InvalidPath(format!(
                "output '{}' is not a directory",
                options.output.display()
            )));
        }
        if options.inline_images && !is_plain_folder_name(&options.inline_folder) {
            return Err(MboxError::ExportError(format!(
                "inline image folder '{}' must be a single folder name",
                options.inline_folder
            )));
        }

        create_dir(&options.output)?;
        let inline_dir = if options.inline_images {
            let dir = options.output.join(&options.inline_folder);
            create_dir(&dir)?;
            Some(dir)
        } else {
            None
        };

        Ok(Self {
            options,
            archive,
            inline_dir,
        })
    }

    /// Number of messages in the archive.
    pub fn message_count(&self) -> u64 {
        self.archive.len()
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Process messages `start..stop` in order.
    ///
    /// `progress` receives `(index, message_count)` after every message.
    /// Part failures are recorded in the summary. An archive read error ends
    /// the run early; the summary then carries it in `read_error` along with
    /// the totals gathered so far.
    pub fn run(&mut self, progress: Option<&dyn Fn(u64, u64)>) -> RunSummary {
        let mut summary = RunSummary {
            totals: RunTotals::default(),
            messages_seen: 0,
            messages_filtered: 0,
            messages_unparsed: 0,
            exhausted: false,
            read_error: None,
        };
        let count = self.archive.len();
        let interval = self.options.progress_interval.max(1);

        let mut index = self.options.start;
        while self.options.stop.is_none_or(|stop| index < stop) {
            let raw = match self.archive.get_message(index) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    info!(index, "The whole archive was processed");
                    summary.exhausted = true;
                    break;
                }
                Err(e) => {
                    let chain = error_chain(&e);
                    error!(index, error = %chain, "Could not read message, stopping");
                    summary.read_error = Some(chain);
                    break;
                }
            };
            summary.messages_seen += 1;
            self.process_message(index, &raw, &mut summary);

            if index % interval == 0 {
                info!(index, "Messages processed");
            }
            if let Some(cb) = progress {
                cb(index, count);
            }
            index += 1;
        }

        info!(
            total = summary.totals.total,
            failed = summary.totals.failed,
            bytes = summary.totals.bytes_written,
            "Extraction finished"
        );
        summary
    }

    fn process_message(&self, index: u64, raw: &[u8], summary: &mut RunSummary) {
        let message = match parse_message(index, raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(index, error = %e, "Skipping message that could not be parsed");
                summary.messages_unparsed += 1;
                return;
            }
        };

        if !self.passes_filters(&message) {
            debug!(index, "Message filtered out");
            summary.messages_filtered += 1;
            return;
        }

        let Some(parts) = message.top_level_parts() else {
            return;
        };
        let mut state = ExtractionState::new();
        for part in parts {
            self.walk(index, part, &mut state, &mut summary.totals);
        }
    }

    fn passes_filters(&self, message: &MailMessage) -> bool {
        let sender_ok = match self.options.sender.as_deref() {
            Some(filter) if !filter.is_empty() => message.sender_matches(filter),
            _ => true,
        };
        let recipient_ok = match self.options.recipient.as_deref() {
            Some(filter) if !filter.is_empty() => message.recipient_matches(filter),
            _ => true,
        };
        sender_ok && recipient_ok
    }

    /// Depth-first walk of one part.
    fn walk(&self, index: u64, part: &Part, state: &mut ExtractionState, totals: &mut RunTotals) {
        let action = classify(part, self.inline_dir.is_some());
        match action {
            PartAction::Descend => {
                if let Part::Multipart { children, .. } = part {
                    for child in children {
                        self.walk(index, child, state, totals);
                    }
                }
            }
            PartAction::Attachment => {
                self.save(index, part, Category::Attachment, state, totals);
            }
            PartAction::Forced { inline } => {
                let content_type = part.content_type();
                if inline {
                    info!(index, content_type, "Extracting inline part");
                } else {
                    info!(index, content_type, "Extracting part with other disposition");
                }
                self.save(index, part, Category::Attachment, state, totals);
            }
            PartAction::InlineImage => {
                self.save(index, part, Category::InlineImage, state, totals);
            }
            PartAction::Skip => {}
        }
    }

    fn save(
        &self,
        index: u64,
        part: &Part,
        category: Category,
        state: &mut ExtractionState,
        totals: &mut RunTotals,
    ) {
        totals.total += 1;

        let dir: &Path = match (category, &self.inline_dir) {
            (Category::InlineImage, Some(dir)) => dir,
            _ => &self.options.output,
        };
        let label = state.next_label(category);

        match save_part(index, part, &label, dir, state, self.options.guess_extensions) {
            Ok(saved) => {
                debug!(index, label = %label, path = %saved.path.display(), "Saved part");
                totals.bytes_written += saved.bytes;
                if saved.shortened {
                    totals.shortened += 1;
                }
            }
            Err(e) => {
                let chain = error_chain(&e);
                error!(index, label = %label, error = %chain, "Failed to save part");
                totals.failed += 1;
                totals.failures.push(PartFailure {
                    message: index,
                    label,
                    error: chain,
                });
            }
        }
    }
}

fn is_plain_folder_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !Path::new(name).is_absolute()
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| MboxError::io(dir, e))
}

/// `error: cause: cause…` for an error and its sources.
fn error_chain(err: &MboxError) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_archive(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("test.mbox");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    const TWO_MESSAGES: &str = "From a@example.com Thu Jan 01 00:00:00 2024\n\
From: Alice <alice@example.com>\n\
To: bob@example.org\n\
Content-Type: multipart/mixed; boundary=\"X\"\n\
\n\
--X\n\
Content-Type: text/plain\n\
\n\
body\n\
--X\n\
Content-Type: application/octet-stream\n\
Content-Disposition: attachment; filename=\"data.bin\"\n\
\n\
1234\n\
--X--\n\
\n\
From c@example.com Thu Jan 01 00:00:00 2024\n\
From: Carol <carol@example.net>\n\
To: dave@example.org\n\
Content-Type: text/plain\n\
\n\
not multipart\n";

    #[test]
    fn test_missing_archive_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let options = ExtractOptions::new(dir.path().join("nope.mbox"), &output);
        let err = Extractor::open(options, None).err().unwrap();
        assert!(matches!(err, MboxError::FileNotFound(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_inline_folder_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_archive(dir.path(), TWO_MESSAGES);

        let mut options = ExtractOptions::new(&input, dir.path().join("a"));
        options.inline_images = false;
        Extractor::open(options, None).unwrap();
        assert!(dir.path().join("a").is_dir());
        assert!(!dir.path().join("a/inline_images").exists());

        let options = ExtractOptions::new(&input, dir.path().join("b"));
        Extractor::open(options, None).unwrap();
        assert!(dir.path().join("b/inline_images").is_dir());
    }

    #[test]
    fn test_output_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_archive(dir.path(), TWO_MESSAGES);
        let options = ExtractOptions::new(&input, &input);
        let err = Extractor::open(options, None).err().unwrap();
        assert!(matches!(err, MboxError::InvalidPath(_)));
    }

    #[test]
    fn test_inline_folder_must_be_one_segment() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_archive(dir.path(), TWO_MESSAGES);
        let mut options = ExtractOptions::new(&input, dir.path().join("out"));
        options.inline_folder = "../escape".into();
        let err = Extractor::open(options, None).err().unwrap();
        assert!(matches!(err, MboxError::ExportError(_)));
        assert!(!dir.path().join("out").exists());

        assert!(is_plain_folder_name("inline_images"));
        assert!(!is_plain_folder_name(""));
        assert!(!is_plain_folder_name(".."));
    }

    #[test]
    fn test_run_counts_parts() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_archive(dir.path(), TWO_MESSAGES);
        let output = dir.path().join("out");

        let mut extractor = Extractor::open(ExtractOptions::new(&input, &output), None).unwrap();
        assert_eq!(extractor.message_count(), 2);
        let summary = extractor.run(None);

        assert_eq!(summary.totals.total, 1);
        assert_eq!(summary.totals.failed, 0);
        assert_eq!(summary.messages_seen, 2);
        assert!(summary.exhausted);
        assert_eq!(std::fs::read(output.join("0 data.bin")).unwrap(), b"1234");
    }

    #[test]
    fn test_stop_before_end_is_not_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_archive(dir.path(), TWO_MESSAGES);
        let mut options = ExtractOptions::new(&input, dir.path().join("out"));
        options.start = 1;
        options.stop = Some(2);

        let summary = Extractor::open(options, None).unwrap().run(None);
        assert_eq!(summary.messages_seen, 1);
        assert_eq!(summary.totals.total, 0);
        assert!(!summary.exhausted);
    }

    #[test]
    fn test_recipient_filter() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_archive(dir.path(), TWO_MESSAGES);
        let mut options = ExtractOptions::new(&input, dir.path().join("out"));
        options.recipient = Some("NOBODY@".into());

        let summary = Extractor::open(options, None).unwrap().run(None);
        assert_eq!(summary.totals.total, 0);
        assert_eq!(summary.messages_filtered, 2);
    }

    #[test]
    fn test_progress_callback_sees_every_message() {
        use std::cell::RefCell;

        let dir = tempfile::tempdir().unwrap();
        let input = write_archive(dir.path(), TWO_MESSAGES);
        let mut extractor =
            Extractor::open(ExtractOptions::new(&input, dir.path().join("out")), None).unwrap();

        let seen = RefCell::new(Vec::new());
        extractor
            .run(Some(&|index, count| seen.borrow_mut().push((index, count))));
        assert_eq!(seen.into_inner(), vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn test_read_error_still_returns_summary() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_archive(dir.path(), TWO_MESSAGES);
        let mut extractor =
            Extractor::open(ExtractOptions::new(&input, dir.path().join("out")), None).unwrap();

        // Cut the file inside the first message after its boundaries are known
        std::fs::OpenOptions::new()
            .write(true)
            .open(&input)
            .unwrap()
            .set_len(40)
            .unwrap();

        let summary = extractor.run(None);
        assert!(!summary.exhausted);
        assert_eq!(summary.messages_seen, 0);
        assert_eq!(summary.totals.total, 0);
        assert!(summary.read_error.is_some());
    }

    #[test]
    fn test_error_chain_includes_io_cause() {
        let err = MboxError::io(
            "/x/y",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = error_chain(&err);
        assert!(text.contains("/x/y"));
        assert!(text.contains("denied"));
    }
}
