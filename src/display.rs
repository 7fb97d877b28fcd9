use log::{debug, warn};
use opencv::{
    core::{Mat, Size},
    highgui,
};

pub const INPUT_WINDOW: &str = "view";
pub const OUTPUT_WINDOW: &str = "skeleton";

/// Milliseconds to let the input window refresh before the rendered frame is shown.
const REFRESH_WAIT_MS: i32 = 30;

pub struct DebugWindow {
    _private: (),
}

impl DebugWindow {
    pub fn open(output_size: Size) -> opencv::Result<Self> {
        highgui::named_window(INPUT_WINDOW, highgui::WINDOW_AUTOSIZE)?;
        highgui::named_window(OUTPUT_WINDOW, highgui::WINDOW_NORMAL)?;
        highgui::resize_window(OUTPUT_WINDOW, output_size.width, output_size.height)?;
        highgui::start_window_thread()?;

        debug!("Opened debug windows '{}' and '{}'", INPUT_WINDOW, OUTPUT_WINDOW);

        Ok(DebugWindow { _private: () })
    }

    pub fn show(&self, input: &Mat, output: &Mat) -> opencv::Result<()> {
        highgui::imshow(INPUT_WINDOW, input)?;
        highgui::wait_key(REFRESH_WAIT_MS)?;

        highgui::imshow(OUTPUT_WINDOW, output)?;
        highgui::wait_key(1)?;

        Ok(())
    }
}

impl Drop for DebugWindow {
    fn drop(&mut self) {
        for name in &[OUTPUT_WINDOW, INPUT_WINDOW] {
            if let Err(err) = highgui::destroy_window(name) {
                warn!("Failed to destroy window '{}': {}", name, err);
            }
        }
    }
}
