use indicatif::{ProgressBar, ProgressStyle};

fn bytes_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.blue} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("##-")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Byte-count bar for a download; falls back to a spinner when the size is unknown.
pub fn download_bar(len: Option<u64>, message: &str) -> ProgressBar {
    let pb = match len {
        Some(len) if len > 0 => {
            let pb = ProgressBar::new(len);
            pb.set_style(bytes_style());
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(spinner_style());
            pb
        }
    };
    pb.set_message(message.to_string());
    pb
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
