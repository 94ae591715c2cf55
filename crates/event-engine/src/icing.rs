//! Rain-on-snow icing classification.

use crate::config::IcingThresholds;
use crate::event::{IcingCategory, PrecipEvent};

/// Stateless rule evaluator over finalized events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcingClassifier {
    thresholds: IcingThresholds,
}

impl IcingClassifier {
    pub fn new(thresholds: IcingThresholds) -> Self {
        Self { thresholds }
    }

    /// Assign an icing category. The snow-depth branches make the three
    /// icing rules mutually exclusive; anything else is `NoIce`, including
    /// events whose deciding temperature was never observed.
    pub fn classify(&self, event: &PrecipEvent) -> IcingCategory {
        let th = &self.thresholds;

        let rain_possible = event
            .max_air_temp_c
            .is_some_and(|t| t > th.min_allowed_air_temp_c)
            && event.rain_mm() > th.min_icing_rain_mm;
        if !rain_possible {
            return IcingCategory::NoIce;
        }

        let snow_at_start = event.start_snow_depth_m > th.min_snow_depth_m;
        let snow_at_end = event.end_snow_depth_m > th.min_snow_depth_m;

        match (snow_at_start, snow_at_end) {
            (true, false) => IcingCategory::MeltedSnowpack,
            (true, true) => IcingCategory::PersistentSnowpackRefreeze,
            (false, _) => match event.max_surface_temp_c {
                Some(t) if t <= 0.0 => IcingCategory::SurfaceFreezeOnBareGround,
                _ => IcingCategory::NoIce,
            },
        }
    }

    /// Classify a batch in place.
    pub fn classify_all(&self, events: &mut [PrecipEvent]) {
        for event in events.iter_mut() {
            event.icing = Some(self.classify(event));
        }
    }
}
