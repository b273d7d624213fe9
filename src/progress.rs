//! Transfer progress bar for the CLI.

use indicatif::{ProgressBar, ProgressStyle};

use fetcher_core::dispatch::Progress;

/// Creates a progress bar, or `None` when output is not shown.
pub(crate) fn transfer_bar(enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    Some(bar)
}

/// Progress callback updating `bar`. Unknown totals leave the length unset.
pub(crate) fn hook(bar: ProgressBar) -> impl Fn(Progress) + Send + Sync + 'static {
    move |progress: Progress| {
        if let Some(total) = progress.bytes_expected {
            bar.set_length(total);
        }
        bar.set_position(progress.bytes_so_far);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_bar_disabled_returns_none() {
        assert!(transfer_bar(false).is_none());
    }

    #[test]
    fn test_hook_tracks_position_and_length() {
        let bar = ProgressBar::hidden();
        let update = hook(bar.clone());
        update(Progress {
            bytes_this_chunk: 10,
            bytes_so_far: 10,
            bytes_expected: Some(40),
        });
        assert_eq!(bar.position(), 10);
        assert_eq!(bar.length(), Some(40));

        update(Progress {
            bytes_this_chunk: 5,
            bytes_so_far: 15,
            bytes_expected: None,
        });
        assert_eq!(bar.position(), 15);
        assert_eq!(bar.length(), Some(40));
    }
}
