//! Numeric constants for the detection pipeline
//!
//! Threshold margins, interpolation guards and the attenuation model used
//! when ranking reflectors.

/// Epsilon for preventing division by zero in quadratic peak interpolation.
pub const INTERPOLATION_EPSILON: f32 = 1e-6;

/// Relative slack allowed when rounding a requested length up to whole bins.
/// Absorbs f32 representation error of exact multiples of the step and
/// nothing larger.
pub const QUANTIZATION_TOLERANCE: f64 = 4.0 * f32::EPSILON as f64;

/// Largest distance accepted for a range start, range length or CFAR span.
pub const MAX_RANGE_M: f32 = 100.0;

/// Largest number of bins a service will bind in a single sweep.
pub const MAX_SWEEP_BINS: usize = 1 << 20;

/// Receiver gain at which the fixed threshold applies unscaled.
pub const REFERENCE_RECEIVER_GAIN: f32 = 0.7;

/// Relative margin above background at sensitivity 0. Sensitivity 1 gives no
/// relative margin.
pub const RECORDED_MAX_RELATIVE_MARGIN: f32 = 1.0;

/// Absolute offset above background at sensitivity 1.
pub const RECORDED_MIN_OFFSET: f32 = 20.0;

/// Additional absolute offset at sensitivity 0.
pub const RECORDED_OFFSET_SPAN: f32 = 180.0;

/// CFAR scale factor at sensitivity 1.
pub const CFAR_MIN_FACTOR: f32 = 1.1;

/// Additional CFAR scale factor at sensitivity 0.
pub const CFAR_FACTOR_SPAN: f32 = 2.9;

/// Amplitude of a point reflector falls as 1/R^2 (received power as 1/R^4).
pub const POINT_REFLECTOR_EXPONENT: i32 = 2;

/// Amplitude of a flat reflector falls as 1/R (received power as 1/R^2).
pub const FLAT_REFLECTOR_EXPONENT: i32 = 1;

/// Upper bound on hardware-accelerated average samples accepted by sensors.
pub const MAX_HW_ACCELERATED_AVERAGE_SAMPLES: u8 = 63;
