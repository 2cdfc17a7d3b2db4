use vigil_core::BatchDetection;

/// Port for detectors that are fitted once and then score whole batches
pub trait BatchDetector: Send {
    /// Fit on a univariate series; `false` leaves the detector unchanged
    fn fit(&mut self, series: &[f64]) -> bool;

    /// Label and score every point; neutral output when not fitted
    fn detect(&mut self, series: &[f64]) -> BatchDetection;

    fn is_fitted(&self) -> bool;

    /// Get the name of the detector
    fn name(&self) -> &str;
}
