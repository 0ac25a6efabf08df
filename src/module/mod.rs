pub mod conv_stage;
