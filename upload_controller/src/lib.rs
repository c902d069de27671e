mod acquisition;
mod client;
mod controller;
mod paste;
mod view;

pub use acquisition::{
    is_image_mime, load_image, AcquiredImage, AcquisitionError, ClipboardItem, ImageSource,
    InputModality, PasteEvent,
};
pub use client::{ClassifyClient, ClassifyReply, ClientError, HttpClassifyClient};
pub use controller::{messages, Session, Status, UploadController};
pub use paste::PasteSubscription;
pub use view::{confidence_percent, PredictionRow, ResultsView};
