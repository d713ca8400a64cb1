// ============================================================
// Layer 5 — Warmup-Linear Learning Rate Schedule
// ============================================================
// With x = step / total_steps and w = warmup fraction:
//
//   factor(x) = x / w          while x ≤ w   (linear warmup)
//             = max(1 − x, 0)  afterwards    (linear decay)
//
//   lr(step) = base_lr × factor(step / total_steps)
//
// Steps are counted from 1, so the very first update already
// uses a non-zero rate.

#[derive(Debug, Clone)]
pub struct WarmupLinear {
    base_lr:     f64,
    warmup:      f64,
    total_steps: usize,
    step:        usize,
}

impl WarmupLinear {
    pub fn new(base_lr: f64, warmup: f64, total_steps: usize) -> Self {
        Self { base_lr, warmup, total_steps, step: 0 }
    }

    /// Multiplier applied to the base rate at `step`
    pub fn factor(&self, step: usize) -> f64 {
        if self.total_steps == 0 {
            return 1.0;
        }
        let x = step as f64 / self.total_steps as f64;
        if self.warmup > 0.0 && x <= self.warmup {
            x / self.warmup
        } else {
            (1.0 - x).max(0.0)
        }
    }

    /// Advance one optimizer step and return its learning rate
    pub fn next_lr(&mut self) -> f64 {
        self.step += 1;
        self.base_lr * self.factor(self.step)
    }

    pub fn steps_taken(&self) -> usize {
        self.step
    }
}
