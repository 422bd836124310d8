use thiserror::Error;

use crate::alarm::AlarmId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlarmError {
    #[error("alarm {id} not found")]
    NotFound { id: AlarmId },

    #[error("alarm {id} is already cleared")]
    NotActive { id: AlarmId },
}

pub type AlarmResult<T> = Result<T, AlarmError>;
