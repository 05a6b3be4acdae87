/// Individual log format parsers

pub mod access_log;
pub mod csv;
pub mod syslog;

// Re-export parser implementations
pub use self::access_log::AccessLogParser;
pub use self::csv::CsvParser;
pub use self::syslog::SyslogParser;
