// store/userstore.rs
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::store::{StoreClient, StoreError};
use crate::models::usermodel::{BusinessProfile, User, UserRole};

#[async_trait]
pub trait UserStoreExt {
    async fn create_user(
        &self,
        user_id: Option<Uuid>,
        email: String,
        name: String,
        role: UserRole,
    ) -> Result<User, StoreError>;

    async fn get_user(&self, user_id: Uuid) -> Option<User>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        name: Option<String>,
        profile_image_url: Option<String>,
    ) -> Result<User, StoreError>;

    async fn create_business_profile(
        &self,
        user_id: Uuid,
        business_name: String,
        category: String,
        description: String,
        address: String,
        hours: Option<String>,
        image_url: Option<String>,
    ) -> Result<BusinessProfile, StoreError>;

    async fn get_business(&self, business_id: Uuid) -> Option<BusinessProfile>;

    async fn get_business_by_user(&self, user_id: Uuid) -> Option<BusinessProfile>;

    async fn list_businesses(&self) -> Vec<BusinessProfile>;
}

#[async_trait]
impl UserStoreExt for StoreClient {
    async fn create_user(
        &self,
        user_id: Option<Uuid>,
        email: String,
        name: String,
        role: UserRole,
    ) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;

        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&email))
        {
            return Err(StoreError::DuplicateRow("user", email));
        }

        let id = user_id.unwrap_or_else(Uuid::new_v4);
        if tables.users.contains_key(&id) {
            return Err(StoreError::DuplicateRow("user", id.to_string()));
        }

        let user = User {
            id,
            email,
            name,
            role,
            profile_complete: false,
            profile_image_url: None,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> Option<User> {
        self.tables.read().await.users.get(&user_id).cloned()
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        name: Option<String>,
        profile_image_url: Option<String>,
    ) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::RowNotFound("user", user_id))?;

        if let Some(name) = name {
            user.name = name;
        }
        if profile_image_url.is_some() {
            user.profile_image_url = profile_image_url;
        }
        user.profile_complete = true;

        Ok(user.clone())
    }

    async fn create_business_profile(
        &self,
        user_id: Uuid,
        business_name: String,
        category: String,
        description: String,
        address: String,
        hours: Option<String>,
        image_url: Option<String>,
    ) -> Result<BusinessProfile, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.businesses.values().any(|b| b.user_id == user_id) {
            return Err(StoreError::DuplicateRow(
                "business profile",
                user_id.to_string(),
            ));
        }

        // Provider onboarding: owning the profile is what makes a provider.
        {
            let user = tables
                .users
                .get_mut(&user_id)
                .ok_or(StoreError::RowNotFound("user", user_id))?;
            user.role = UserRole::Provider;
            user.profile_complete = true;
        }

        let business = BusinessProfile {
            id: Uuid::new_v4(),
            user_id,
            business_name,
            category,
            description,
            address,
            hours,
            image_url,
            created_at: Utc::now(),
        };
        tables.businesses.insert(business.id, business.clone());

        Ok(business)
    }

    async fn get_business(&self, business_id: Uuid) -> Option<BusinessProfile> {
        self.tables
            .read()
            .await
            .businesses
            .get(&business_id)
            .cloned()
    }

    async fn get_business_by_user(&self, user_id: Uuid) -> Option<BusinessProfile> {
        self.tables
            .read()
            .await
            .businesses
            .values()
            .find(|b| b.user_id == user_id)
            .cloned()
    }

    async fn list_businesses(&self) -> Vec<BusinessProfile> {
        let tables = self.tables.read().await;
        let mut businesses: Vec<BusinessProfile> = tables.businesses.values().cloned().collect();
        businesses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        businesses
    }
}
