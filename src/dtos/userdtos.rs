use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::usermodel::UserRole;

// Identity itself lives outside the core; registration is the hook the
// external auth collaborator calls with the id it issued.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct RegisterUserDto {
    pub user_id: Option<Uuid>,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    pub role: UserRole,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct UpdateProfileDto {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,

    #[validate(url(message = "Invalid profile image URL"))]
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct OnboardBusinessDto {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Business name must be between 1 and 100 characters"
    ))]
    pub business_name: String,

    #[validate(length(min = 1, max = 50, message = "Category is required"))]
    pub category: String,

    #[validate(length(
        min = 10,
        max = 2000,
        message = "Description must be between 10 and 2000 characters"
    ))]
    pub description: String,

    #[validate(length(min = 1, max = 200, message = "Address is required"))]
    pub address: String,

    pub hours: Option<String>,

    #[validate(url(message = "Invalid image URL"))]
    pub image_url: Option<String>,
}
