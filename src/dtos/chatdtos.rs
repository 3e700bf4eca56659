use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SendMessageDto {
    pub receiver_id: Uuid,

    #[validate(length(
        min = 1,
        max = 2000,
        message = "Message content must be between 1 and 2000 characters"
    ))]
    pub content: String,
}
