//! Unwrapping of bounded [0, 360) angles into a continuous signal, so a
//! rotation animation never snaps across the 0/360 boundary.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeadingState {
    pub continuous: f64,
    pub last_raw: f64,
}

/// One instance per angle stream. Device heading and map camera heading
/// must each own their own unwrapper.
#[derive(Clone, Debug, Default)]
pub struct HeadingUnwrapper {
    state: Option<HeadingState>,
}

impl HeadingUnwrapper {
    pub fn new() -> Self {
        HeadingUnwrapper { state: None }
    }

    pub fn update(&mut self, raw: f64) -> f64 {
        let state = match self.state {
            None => HeadingState {
                continuous: raw,
                last_raw: raw,
            },
            Some(prev) => {
                let mut delta = raw - prev.last_raw;
                if delta > 180.0 {
                    delta -= 360.0;
                }
                if delta < -180.0 {
                    delta += 360.0;
                }
                HeadingState {
                    continuous: prev.continuous + delta,
                    last_raw: raw,
                }
            }
        };
        self.state = Some(state);
        state.continuous
    }

    pub fn current(&self) -> Option<f64> {
        self.state.map(|s| s.continuous)
    }

    pub fn last_raw(&self) -> Option<f64> {
        self.state.map(|s| s.last_raw)
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}
