//! Outcome classification for a single download.
//!
//! Every expected condition in the pipeline ends as a [`DownloadStatus`].
//! The numeric order is load-bearing: everything from [`DownloadStatus::Skipped`]
//! upward is a skip, everything from [`DownloadStatus::Failed`] upward is a
//! failure.

use std::fmt;

/// Final status of one download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DownloadStatus {
    Success = 0,

    Ignored = 1,

    Skipped = 2,
    SkippedDuplicate = 3,
    SkippedUnpermittedDomain = 4,
    SkippedUnpermittedExtension = 5,
    SkippedUnpermittedFilename = 6,
    SkippedUnpermittedReaction = 7,
    SkippedUnpermittedType = 8,
    SkippedDetectedDuplicate = 9,

    Failed = 10,
    FailedCode = 11,
    FailedCode403 = 12,
    FailedCode404 = 13,
    FailedInvalidSource = 14,
    FailedInvalidPath = 15,
    FailedCreatingFolder = 16,
    FailedRequesting = 17,
    FailedDownloadingResponse = 18,
    FailedReadResponse = 19,
    FailedCreatingSubfolder = 20,
    FailedWritingFile = 21,
    FailedWritingDatabase = 22,
}

/// Coarse severity band of a [`DownloadStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Success,
    Ignored,
    Skip,
    Fail,
}

impl DownloadStatus {
    /// Severity band, ordered `Success < Ignored < Skip < Fail`.
    #[must_use]
    pub fn tier(self) -> Tier {
        if self >= Self::Failed {
            Tier::Fail
        } else if self >= Self::Skipped {
            Tier::Skip
        } else if self == Self::Ignored {
            Tier::Ignored
        } else {
            Tier::Success
        }
    }

    /// Returns true for any failure status.
    #[must_use]
    pub fn is_failure(self) -> bool {
        self >= Self::Failed
    }

    /// Returns true for any skip or failure status.
    #[must_use]
    pub fn is_skip_or_worse(self) -> bool {
        self >= Self::Skipped
    }

    /// Returns true when retrying cannot change the outcome.
    ///
    /// Anything below the failure band is final, as are 403, 404 and the
    /// local failures that happen before any network traffic (bad source
    /// URL, bad destination, folder creation).
    #[must_use]
    pub fn is_final(self) -> bool {
        !self.is_failure()
            || matches!(
                self,
                Self::FailedCode403
                    | Self::FailedCode404
                    | Self::FailedInvalidSource
                    | Self::FailedInvalidPath
                    | Self::FailedCreatingFolder
                    | Self::FailedCreatingSubfolder
            )
    }

    /// Human-readable label used in logs and failure notices.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "Succeeded",
            Self::Ignored => "Ignored",
            Self::Skipped => "Skipped",
            Self::SkippedDuplicate => "Skipped - Duplicate",
            Self::SkippedUnpermittedDomain => "Skipped - Unpermitted Domain",
            Self::SkippedUnpermittedExtension => "Skipped - Unpermitted File Extension",
            Self::SkippedUnpermittedFilename => "Skipped - Unpermitted Filename Content",
            Self::SkippedUnpermittedReaction => "Skipped - Unpermitted Message Reaction",
            Self::SkippedUnpermittedType => "Skipped - Unpermitted File Type",
            Self::SkippedDetectedDuplicate => "Skipped - Detected Duplicate",
            Self::Failed => "Failed",
            Self::FailedCode => "Failed - BAD CONNECTION",
            Self::FailedCode403 => "Failed - 403 UNAVAILABLE",
            Self::FailedCode404 => "Failed - 404 NOT FOUND",
            Self::FailedInvalidSource => "Failed - Invalid Source",
            Self::FailedInvalidPath => "Failed - Invalid Path",
            Self::FailedCreatingFolder => "Failed - Error Creating Folder",
            Self::FailedRequesting => "Failed - Error Requesting",
            Self::FailedDownloadingResponse => "Failed - Error Downloading Data",
            Self::FailedReadResponse => "Failed - Error Reading Data",
            Self::FailedCreatingSubfolder => "Failed - Error Mapping Subfolder(s)",
            Self::FailedWritingFile => "Failed - Error Saving File",
            Self::FailedWritingDatabase => "Failed - Error Saving to Database",
        }
    }

    /// Maps an HTTP error status to the matching failure.
    #[must_use]
    pub fn from_http_status(status: u16) -> Self {
        match status {
            403 => Self::FailedCode403,
            404 => Self::FailedCode404,
            _ => Self::FailedCode,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A status paired with the fault that produced it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub status: DownloadStatus,
    pub error: Option<String>,
}

impl DownloadOutcome {
    /// Outcome without an underlying fault.
    #[must_use]
    pub fn new(status: DownloadStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    /// Outcome carrying the fault text.
    #[must_use]
    pub fn with_error(status: DownloadStatus, error: impl fmt::Display) -> Self {
        Self {
            status,
            error: Some(error.to_string()),
        }
    }
}

impl From<DownloadStatus> for DownloadOutcome {
    fn from(status: DownloadStatus) -> Self {
        Self::new(status)
    }
}
