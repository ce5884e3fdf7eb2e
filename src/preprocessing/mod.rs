/// Модуль предобработки данных

pub mod normalization;
pub mod schema;
pub mod split;
pub mod windowing;

pub use normalization::{
    column_names, preprocess_dataframes, preprocess_using_coefficients, Coefficients, ColumnRoles,
    NormalizationCoefficients, Preprocessed,
};
pub use schema::{prepare_signals, EntitySignal, FieldType, Schema, Signal, SignalDeclaration};
pub use split::{split_data, SplitFractions};
pub use windowing::{make_datasets, WindowGenerator, WindowParams, WindowedDataset};
