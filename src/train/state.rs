/// Counters threaded through the epoch and batch loops.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrainingState {
    /// The current epoch, starting from 1. Zero before the first epoch.
    pub epoch: usize,
    /// The number of finished batch iterations over the whole run.
    pub iteration: usize,
    pub best_valid_loss: Option<f64>,
}

impl TrainingState {
    pub fn next_epoch(&mut self) -> usize {
        self.epoch += 1;
        self.epoch
    }

    pub fn next_iteration(&mut self) -> usize {
        self.iteration += 1;
        self.iteration
    }

    /// Records a validation loss and tells whether it is the best so far.
    pub fn update_best_valid_loss(&mut self, loss: f64) -> bool {
        match self.best_valid_loss {
            Some(best) if best <= loss => false,
            _ => {
                self.best_valid_loss = Some(loss);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_state_test() {
        let mut state = TrainingState::default();
        assert_eq!(state.next_epoch(), 1);
        assert_eq!(state.next_iteration(), 1);
        assert_eq!(state.next_iteration(), 2);
        assert_eq!(state.next_epoch(), 2);
        assert_eq!(state.iteration, 2);

        assert!(state.update_best_valid_loss(0.5));
        assert!(!state.update_best_valid_loss(0.7));
        assert!(!state.update_best_valid_loss(0.5));
        assert!(state.update_best_valid_loss(0.2));
        assert_eq!(state.best_valid_loss, Some(0.2));
    }
}
