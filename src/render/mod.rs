//! Chart rendering.
//!
//! A [`ChartPlan`] holds every computed title, series and axis range; the
//! drawing step only rasterizes it. Faults while drawing, panics included,
//! come back as [`RenderError`].

mod draw;
pub mod plan;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use plotters::drawing::DrawingAreaErrorKind;

use crate::config::RenderConfig;
pub use plan::{CaptureLabels, ChartPlan, LineSpec, Panel};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no finite samples in {0}")]
    EmptySeries(String),
    #[error("drawing failed: {0}")]
    Backend(String),
    #[error("cannot draw a {0}x{1} image")]
    Buffer(u32, u32),
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("drawing panicked: {0}")]
    Panicked(String),
}

impl<E> From<DrawingAreaErrorKind<E>> for RenderError
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        RenderError::Backend(err.to_string())
    }
}

/// Rasterize `plan` to PNG bytes.
pub fn render(plan: &ChartPlan, cfg: &RenderConfig) -> Result<Vec<u8>, RenderError> {
    match panic::catch_unwind(AssertUnwindSafe(|| draw::rasterize(plan, cfg))) {
        Ok(result) => result,
        Err(payload) => Err(RenderError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
