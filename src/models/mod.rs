/// Stacked LSTM layers with backpropagation through time.
pub mod lstm_network;

/// LSTM + dense head regressor for cycle windows.
pub mod cycle_model;
