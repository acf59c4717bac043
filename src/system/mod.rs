pub mod channels;
pub mod resources;

/// Uptime in milliseconds, the time base of the convoy link
///
/// Wraps after ~49 days; the link only ever looks at wrapping differences.
pub fn now_ms() -> u32 {
    embassy_time::Instant::now().as_millis() as u32
}
