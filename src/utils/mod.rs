pub mod clock;

/// Formats a `chrono::Duration` as `Dd HH:MM:SS.mmm`, used for logging
/// uptime and cross-node timing in a human-friendly form.
pub fn format_duration(duration: &chrono::Duration) -> String {
    let milliseconds = format!("{:0>3}", duration.num_milliseconds() % 1000);
    let seconds = format!("{:0>2}", duration.num_seconds() % 60);
    let minutes = format!("{:0>2}", duration.num_minutes() % 60);
    let hours = format!("{:0>2}", duration.num_hours() % 24);
    let days = duration.num_days().to_string();

    format!("{days}d {hours}:{minutes}:{seconds}.{milliseconds}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sub_day_duration() {
        let d = chrono::Duration::milliseconds(3_723_456);
        assert_eq!(format_duration(&d), "0d 01:02:03.456");
    }
}
