use std::collections::VecDeque;

/// Moving average over the most recent speed readings (km/h).
///
/// Threshold scaling uses this instead of instantaneous speed so GPS jitter
/// does not make the thresholds jump between samples.
#[derive(Clone, Debug)]
pub struct SpeedHistory {
    window: VecDeque<f64>,
    window_size: usize,
}

impl SpeedHistory {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        SpeedHistory {
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    pub fn push(&mut self, speed_kmh: f64) {
        self.window.push_back(speed_kmh);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }
    }

    /// Mean of the buffered speeds, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Single-pole low-pass for the vertical axis: `y = α·x + (1-α)·y_prev`.
///
/// Starts from zero, so the first output is `α·x`.
#[derive(Clone, Debug)]
pub struct VerticalLowPass {
    alpha: f64,
    last_output: f64,
}

impl VerticalLowPass {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            last_output: 0.0,
        }
    }

    pub fn apply(&mut self, value: f64) -> f64 {
        self.last_output = self.alpha * value + (1.0 - self.alpha) * self.last_output;
        self.last_output
    }
}
