use thiserror::Error;

/// Errors raised while loading a signature database.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Signature source is not parseable: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Signature source contains no valid records")]
    NoValidRecords,
}

/// Errors raised while applying variable modifiers to a match.
///
/// Each timestamp component gets its own variant so logs can say exactly
/// which field of a save's comment text was out of range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModifierError {
    #[error("Variable {0} is declared as a single character but has value {1:?}")]
    NotSingleChar(String, String),

    #[error("Year {0} is out of range (expected 0-99 or 2000-9999)")]
    YearOutOfRange(i64),

    #[error("Month {0} is out of range (expected 1-12)")]
    MonthOutOfRange(i64),

    #[error("Day {0} is out of range (expected 1-31)")]
    DayOutOfRange(i64),

    #[error("Hour {0} is out of range (expected 0-23)")]
    HourOutOfRange(i64),

    #[error("Minute {0} is out of range (expected 0-59)")]
    MinuteOutOfRange(i64),

    #[error("Second {0} is out of range (expected 0-59)")]
    SecondOutOfRange(i64),
}

/// Errors that prevent a scan from starting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("No memory card has been set")]
    NoCard,

    #[error("No signature databases are loaded")]
    NoDatabases,

    #[error("A scan is already in progress")]
    Busy,
}
