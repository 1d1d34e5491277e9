use crate::config::lifecycle_thresholds::*;
use crate::types::{LifecycleStage, Scale};

/// Everything the lifecycle decision looks at. Nothing else leaks in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleInputs {
    /// Sum of all volume-proxy points in the window.
    pub total_volume: f64,
    pub volume_growth: f64,
    /// Composite score minus the previously stored composite score (0 when unknown).
    pub acceleration: f64,
    pub scale: Scale,
}

/// Absolute-volume cutoffs. Micro trends never reach macro volumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeThresholds {
    pub dormant: f64,
    pub emerging_ceiling: f64,
    pub peak_floor: f64,
}

impl VolumeThresholds {
    pub fn for_scale(scale: Scale) -> Self {
        match scale {
            Scale::Macro => Self {
                dormant: MACRO_DORMANT,
                emerging_ceiling: MACRO_EMERGING_CEILING,
                peak_floor: MACRO_PEAK_FLOOR,
            },
            Scale::Micro => Self {
                dormant: MICRO_DORMANT,
                emerging_ceiling: MICRO_EMERGING_CEILING,
                peak_floor: MICRO_PEAK_FLOOR,
            },
        }
    }
}

/// Stateless lifecycle decision. First matching rule wins; the order matters
/// because several rules overlap.
pub fn classify(inputs: &LifecycleInputs) -> LifecycleStage {
    let t = VolumeThresholds::for_scale(inputs.scale);
    let vol = inputs.total_volume;
    let growth = inputs.volume_growth;
    let accel = inputs.acceleration;

    if vol < t.dormant {
        LifecycleStage::Dormant
    } else if growth > 30.0 && vol < t.emerging_ceiling {
        LifecycleStage::Emerging
    } else if growth > 20.0 && accel > 0.0 {
        LifecycleStage::Accelerating
    } else if (-5.0..=10.0).contains(&growth) && vol > t.peak_floor {
        if accel <= 0.0 {
            LifecycleStage::Peak
        } else {
            LifecycleStage::Accelerating
        }
    } else if (-20.0..-5.0).contains(&growth) {
        LifecycleStage::Saturation
    } else if growth < -20.0 {
        LifecycleStage::Decline
    } else if growth > 10.0 {
        LifecycleStage::Emerging
    } else {
        LifecycleStage::Peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(total_volume: f64, volume_growth: f64, acceleration: f64, scale: Scale) -> LifecycleInputs {
        LifecycleInputs {
            total_volume,
            volume_growth,
            acceleration,
            scale,
        }
    }

    #[test]
    fn low_volume_is_dormant_regardless_of_growth() {
        assert_eq!(classify(&inputs(4.9, 500.0, 10.0, Scale::Macro)), LifecycleStage::Dormant);
        assert_eq!(classify(&inputs(1.9, 500.0, 10.0, Scale::Micro)), LifecycleStage::Dormant);
    }

    #[test]
    fn micro_thresholds_are_lower() {
        // 3 units: dormant for macro, live for micro.
        assert_eq!(classify(&inputs(3.0, 40.0, 0.0, Scale::Macro)), LifecycleStage::Dormant);
        assert_eq!(classify(&inputs(3.0, 40.0, 0.0, Scale::Micro)), LifecycleStage::Emerging);
        // 20 units with flat growth: above the micro peak floor, below the macro one.
        assert_eq!(classify(&inputs(20.0, 0.0, 0.0, Scale::Micro)), LifecycleStage::Peak);
        assert_eq!(classify(&inputs(20.0, 0.0, 0.0, Scale::Macro)), LifecycleStage::Peak);
    }

    #[test]
    fn strong_growth_at_low_volume_is_emerging() {
        assert_eq!(classify(&inputs(50.0, 35.0, 5.0, Scale::Macro)), LifecycleStage::Emerging);
    }

    #[test]
    fn strong_growth_with_acceleration_above_ceiling_is_accelerating() {
        assert_eq!(classify(&inputs(500.0, 35.0, 5.0, Scale::Macro)), LifecycleStage::Accelerating);
        assert_eq!(classify(&inputs(16.0, 25.0, 1.0, Scale::Micro)), LifecycleStage::Accelerating);
    }

    #[test]
    fn flat_growth_at_high_volume_splits_on_acceleration() {
        assert_eq!(classify(&inputs(200.0, 5.0, 0.0, Scale::Macro)), LifecycleStage::Peak);
        assert_eq!(classify(&inputs(200.0, 5.0, -3.0, Scale::Macro)), LifecycleStage::Peak);
        assert_eq!(classify(&inputs(200.0, 5.0, 0.1, Scale::Macro)), LifecycleStage::Accelerating);
        assert_eq!(classify(&inputs(200.0, -5.0, 0.0, Scale::Macro)), LifecycleStage::Peak);
        assert_eq!(classify(&inputs(200.0, 10.0, 0.0, Scale::Macro)), LifecycleStage::Peak);
    }

    #[test]
    fn negative_growth_bands() {
        assert_eq!(classify(&inputs(200.0, -5.01, 0.0, Scale::Macro)), LifecycleStage::Saturation);
        assert_eq!(classify(&inputs(200.0, -20.0, 0.0, Scale::Macro)), LifecycleStage::Saturation);
        assert_eq!(classify(&inputs(200.0, -20.01, 0.0, Scale::Macro)), LifecycleStage::Decline);
    }

    #[test]
    fn moderate_negative_growth_with_positive_acceleration_still_saturates() {
        assert_eq!(classify(&inputs(200.0, -8.0, 12.0, Scale::Macro)), LifecycleStage::Saturation);
    }

    #[test]
    fn fallback_branch() {
        // Growth in (10, 20] with no acceleration above the emerging ceiling.
        assert_eq!(classify(&inputs(200.0, 15.0, -1.0, Scale::Macro)), LifecycleStage::Emerging);
        // Flat growth but volume under the peak floor.
        assert_eq!(classify(&inputs(30.0, 2.0, 1.0, Scale::Macro)), LifecycleStage::Peak);
        // Growth > 30 over the ceiling with no acceleration.
        assert_eq!(classify(&inputs(150.0, 45.0, 0.0, Scale::Macro)), LifecycleStage::Emerging);
    }

    #[test]
    fn identical_inputs_give_identical_stage() {
        let i = inputs(75.0, 12.5, -0.5, Scale::Micro);
        let first = classify(&i);
        for _ in 0..10 {
            assert_eq!(classify(&i), first);
        }
    }
}
