
use indicatif::{ProgressBar, ProgressState, ProgressStyle};

/// Shared progress bar styling for long loops over sites and boosting rounds
pub fn get_progress_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}); ETA: {eta_precise}; {msg}")
        .unwrap_or_else(|_e| ProgressStyle::default_bar())
        .with_key("percent", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.1}%", state.fraction() * 100.0);
        })
        .progress_chars("##-")
}

/// Creates a styled bar that has already drawn once
/// # Arguments
/// * `length` - number of steps
/// * `message` - label shown next to the bar
pub fn styled_progress_bar(length: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(length)
        .with_style(get_progress_style())
        .with_message(message.to_string());
    pb.tick();
    pb
}
