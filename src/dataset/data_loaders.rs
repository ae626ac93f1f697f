mod edema_dataset_loader;

pub use edema_dataset_loader::*;
