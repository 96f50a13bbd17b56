//! Dual-mode cart store.
//!
//! One logical cart backed by either the client-held [`GuestCart`] or the
//! server-persisted [`UserCart`]. Which one is active depends only on the
//! [`Session`] handed to the store; callers never branch on it.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument};

use crate::domain::aggregates::{CartEntry, CartSummary, Product};
use crate::domain::value_objects::{ProductId, Quantity, UserId};
use crate::error::{CartError, Result};
use crate::reconcile::{MergeReport, Reconciler};
use crate::store::{ProductCatalog, SessionResolver, Stores};

pub mod guest;
pub mod user;

pub use guest::GuestCart;
pub use user::UserCart;

/// Authentication state as seen by the cart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Session {
    user: Option<UserId>,
}

impl Session {
    pub const fn guest() -> Self { Self { user: None } }
    pub const fn user(id: UserId) -> Self { Self { user: Some(id) } }
    pub fn user_id(&self) -> Option<UserId> { self.user }

    /// Looks the bearer token up with the auth service. No token, or a token
    /// the service does not know, is a guest session.
    pub async fn resolve(sessions: &dyn SessionResolver, token: Option<&str>) -> Result<Self> {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Ok(Self { user: sessions.current_user(token).await? }),
            None => Ok(Self::guest()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "user_id", rename_all = "snake_case")]
pub enum CartMode {
    Guest,
    User(UserId),
}

/// Mutation/query interface shared by both persistence substrates.
#[async_trait]
pub trait CartBackend: Send + Sync {
    fn mode(&self) -> CartMode;
    async fn add_item(&mut self, product: &Product, quantity: Quantity) -> Result<()>;
    async fn update_quantity(&mut self, product: ProductId, quantity: i64) -> Result<()>;
    async fn remove_item(&mut self, product: ProductId) -> Result<()>;
    async fn entries(&self) -> Result<Vec<CartEntry>>;
    async fn count(&self) -> Result<u32>;
    async fn clear(&mut self) -> Result<()>;
    async fn remove_ordered(&mut self, ordered: &[(ProductId, Quantity)]) -> Result<()>;
}

#[async_trait]
impl CartBackend for GuestCart {
    fn mode(&self) -> CartMode { CartMode::Guest }

    async fn add_item(&mut self, product: &Product, quantity: Quantity) -> Result<()> {
        GuestCart::add_item(self, product, quantity)
    }

    async fn update_quantity(&mut self, product: ProductId, quantity: i64) -> Result<()> {
        GuestCart::update_quantity(self, product, quantity)
    }

    async fn remove_item(&mut self, product: ProductId) -> Result<()> {
        GuestCart::remove_item(self, product);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<CartEntry>> { Ok(GuestCart::entries(self)) }

    async fn count(&self) -> Result<u32> { Ok(GuestCart::count(self)) }

    async fn clear(&mut self) -> Result<()> {
        GuestCart::clear(self);
        Ok(())
    }

    async fn remove_ordered(&mut self, ordered: &[(ProductId, Quantity)]) -> Result<()> {
        GuestCart::remove_ordered(self, ordered);
        Ok(())
    }
}

#[async_trait]
impl CartBackend for UserCart {
    fn mode(&self) -> CartMode { CartMode::User(self.user()) }

    async fn add_item(&mut self, product: &Product, quantity: Quantity) -> Result<()> {
        UserCart::add_item(self, product, quantity).await
    }

    async fn update_quantity(&mut self, product: ProductId, quantity: i64) -> Result<()> {
        UserCart::update_quantity(self, product, quantity).await
    }

    async fn remove_item(&mut self, product: ProductId) -> Result<()> {
        UserCart::remove_item(self, product).await
    }

    async fn entries(&self) -> Result<Vec<CartEntry>> { UserCart::entries(self).await }

    async fn count(&self) -> Result<u32> { UserCart::count(self).await }

    async fn clear(&mut self) -> Result<()> { UserCart::clear(self).await }

    async fn remove_ordered(&mut self, ordered: &[(ProductId, Quantity)]) -> Result<()> {
        UserCart::remove_ordered(self, ordered).await
    }
}

/// Result of re-evaluating the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthTransition {
    Unchanged,
    LoggedIn(UserId),
    LoggedOut,
}

pub struct CartStore {
    guest: GuestCart,
    user: Option<UserCart>,
    stores: Stores,
}

impl CartStore {
    pub fn new(session: Session, guest: GuestCart, stores: &Stores) -> Self {
        let user = session.user_id().map(|id| UserCart::new(id, stores.carts.clone()));
        Self { guest, user, stores: stores.clone() }
    }

    pub fn mode(&self) -> CartMode { self.active().mode() }
    pub fn user_id(&self) -> Option<UserId> { self.user.as_ref().map(UserCart::user) }

    /// Client-held state to hand back to the caller after each operation.
    pub fn guest(&self) -> &GuestCart { &self.guest }
    pub fn into_guest(self) -> GuestCart { self.guest }

    pub(crate) fn guest_mut(&mut self) -> &mut GuestCart { &mut self.guest }
    pub(crate) fn user_cart(&self) -> Option<&UserCart> { self.user.as_ref() }
    pub(crate) fn catalog(&self) -> &dyn ProductCatalog { self.stores.catalog.as_ref() }

    fn active(&self) -> &dyn CartBackend {
        match &self.user {
            Some(user) => user,
            None => &self.guest,
        }
    }

    fn active_mut(&mut self) -> &mut dyn CartBackend {
        match &mut self.user {
            Some(user) => user,
            None => &mut self.guest,
        }
    }

    /// Switches backend when the authentication state changed. Logging out
    /// does not copy anything back into the guest cart.
    pub fn set_session(&mut self, session: Session) -> AuthTransition {
        let current = self.user.as_ref().map(UserCart::user);
        match (current, session.user_id()) {
            (a, b) if a == b => AuthTransition::Unchanged,
            (_, Some(id)) => {
                self.user = Some(UserCart::new(id, self.stores.carts.clone()));
                AuthTransition::LoggedIn(id)
            }
            (Some(_), None) => {
                self.user = None;
                AuthTransition::LoggedOut
            }
            (None, None) => AuthTransition::Unchanged,
        }
    }

    /// Switches to the user's cart and merges whatever the guest cart holds.
    /// On a partial failure the store stays in User mode and the unmerged
    /// lines remain in the guest cart for the next attempt.
    #[instrument(skip(self, reconciler))]
    pub async fn login(&mut self, user: UserId, reconciler: &Reconciler) -> Result<MergeReport> {
        if let AuthTransition::LoggedIn(id) = self.set_session(Session::user(user)) {
            info!(user = %id, "cart switched to user mode");
        }
        reconciler.reconcile(self).await
    }

    pub fn logout(&mut self) -> AuthTransition { self.set_session(Session::guest()) }

    #[instrument(skip(self), fields(mode = ?self.mode()))]
    pub async fn add_item(&mut self, product_id: ProductId, quantity: i64) -> Result<()> {
        let quantity = Quantity::new(quantity)?;
        let product = self.stores.catalog.product(product_id).await?.ok_or(CartError::ProductNotFound(product_id))?;
        self.active_mut().add_item(&product, quantity).await
    }

    #[instrument(skip(self), fields(mode = ?self.mode()))]
    pub async fn update_quantity(&mut self, product_id: ProductId, quantity: i64) -> Result<()> {
        self.active_mut().update_quantity(product_id, quantity).await
    }

    #[instrument(skip(self), fields(mode = ?self.mode()))]
    pub async fn remove_item(&mut self, product_id: ProductId) -> Result<()> {
        self.active_mut().remove_item(product_id).await
    }

    /// Current lines of the active cart.
    pub async fn entries(&self) -> Result<Vec<CartEntry>> { self.active().entries().await }

    /// Rebuilt from the lines on every call.
    pub async fn get_summary(&self) -> Result<CartSummary> {
        Ok(CartSummary::from_entries(self.entries().await?))
    }

    pub async fn get_count(&self) -> Result<u32> { self.active().count().await }

    pub async fn clear(&mut self) -> Result<()> { self.active_mut().clear().await }

    /// Takes the ordered quantities off the active cart. Lines added after
    /// the order snapshot, on this device or another, are kept.
    pub async fn remove_ordered(&mut self, ordered: &[(ProductId, Quantity)]) -> Result<()> {
        self.active_mut().remove_ordered(ordered).await
    }
}
