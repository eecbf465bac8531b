mod datetime;
mod filesystem;
mod string;

pub use datetime::{
    datetime_to_excel_serial, excel_serial_to_datetime, format_datetime, get_utc_iso_datetime,
    parse_iso_datetime,
};
pub use filesystem::write_error_to_log;
pub use string::{is_blank, normalize_header, unnamed_header};
