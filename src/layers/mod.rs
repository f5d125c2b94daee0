/// Recurrent cell used by the forecasting network.
pub mod lstm_cell;

/// Dense output head.
pub mod linear;
