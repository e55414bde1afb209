//! Numeric identifiers for the diagnostic events emitted by dbcontext.

/// Event identifiers passed to a [`LogSink`](super::LogSink) with each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RelationalEventId {
    ExecutedCommand = 1,
    CommandError = 2,
    CreatingDatabase = 3,
    DeletingDatabase = 4,
    OpeningConnection = 5,
    ClosingConnection = 6,
    BeginningTransaction = 7,
    CommittingTransaction = 8,
    RollingbackTransaction = 9,
    CreatingSavepoint = 10,
    RollingbackToSavepoint = 11,
    ReleasingSavepoint = 12,
    TransactionIgnored = 13,
}

impl RelationalEventId {
    pub fn id(self) -> i32 {
        self as i32
    }

    fn name(self) -> &'static str {
        match self {
            Self::ExecutedCommand => "ExecutedCommand",
            Self::CommandError => "CommandError",
            Self::CreatingDatabase => "CreatingDatabase",
            Self::DeletingDatabase => "DeletingDatabase",
            Self::OpeningConnection => "OpeningConnection",
            Self::ClosingConnection => "ClosingConnection",
            Self::BeginningTransaction => "BeginningTransaction",
            Self::CommittingTransaction => "CommittingTransaction",
            Self::RollingbackTransaction => "RollingbackTransaction",
            Self::CreatingSavepoint => "CreatingSavepoint",
            Self::RollingbackToSavepoint => "RollingbackToSavepoint",
            Self::ReleasingSavepoint => "ReleasingSavepoint",
            Self::TransactionIgnored => "TransactionIgnored",
        }
    }
}

impl std::fmt::Display for RelationalEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}
