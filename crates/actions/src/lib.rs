//! Action groups shipped with launchgrid.
//!
//! | Group             | Actions | Arguments                          |
//! |-------------------|---------|------------------------------------|
//! | `OpenLink`        | `run`   | `url`                              |
//! | `RandomColor`     | `run`   | `speed` (updates per second)       |
//! | `Paint`           | `run`   | `color`                            |
//! | `AudioVisualizer` | `run`   | `device`, `colors`, `reference`    |

use launchgrid_core::ActionCatalog;

mod open_link;
mod paint;
mod random_color;
mod visualizer;

pub use open_link::{OpenLink, OpenLinkArgs};
pub use paint::{Paint, PaintArgs};
pub use random_color::{RandomColor, RandomColorArgs};
pub use visualizer::{column_heights, AudioVisualizer, SpectrumAnalyzer, VisualizerArgs};

/// Catalog with every bundled group.
pub fn default_catalog() -> ActionCatalog {
    ActionCatalog::new()
        .with(OpenLink)
        .with(RandomColor)
        .with(Paint)
        .with(AudioVisualizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = default_catalog();
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(
            names,
            vec!["AudioVisualizer", "OpenLink", "Paint", "RandomColor"]
        );
    }
}
