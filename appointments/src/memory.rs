//! In-memory adapters for every port.
//!
//! Used by the `memory` storage backend, by tests, and as the reference
//! behaviour the PostgreSQL adapters are checked against. Every adapter
//! is cheap to clone; clones share state.

use crate::engine::EnginePorts;
use crate::error::{NotificationError, StorageError};
use crate::ports::{
    AppointmentNotification, AppointmentStore, Catalog, NotificationEmitter, RatingLedger,
    StockDecrement, StockLedger,
};
use crate::types::{
    Appointment, AppointmentId, AppointmentQuery, AppointmentStatus, AvailabilityWindow, Listing,
    ProductId, Rating, RatingDirection, Role, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|_| StorageError::Backend("in-memory lock poisoned".to_string()))
}

// ============================================================================
// Stock ledger
// ============================================================================

/// Stock levels keyed by product.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockLedger {
    levels: Arc<Mutex<HashMap<ProductId, u32>>>,
}

impl InMemoryStockLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the available quantity for a product.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the lock is poisoned.
    pub fn set(&self, product_id: ProductId, quantity: u32) -> Result<(), StorageError> {
        lock(&self.levels)?.insert(product_id, quantity);
        Ok(())
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn available(&self, product_id: ProductId) -> Result<u32, StorageError> {
        Ok(lock(&self.levels)?.get(&product_id).copied().unwrap_or(0))
    }

    async fn try_decrement(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockDecrement, StorageError> {
        let mut levels = lock(&self.levels)?;
        let available = levels.get(&product_id).copied().unwrap_or(0);
        if available < quantity {
            return Ok(StockDecrement::Insufficient { available });
        }
        let remaining = available - quantity;
        levels.insert(product_id, remaining);
        Ok(StockDecrement::Applied { remaining })
    }

    async fn restore(&self, product_id: ProductId, quantity: u32) -> Result<(), StorageError> {
        let mut levels = lock(&self.levels)?;
        let level = levels.entry(product_id).or_insert(0);
        *level = level.saturating_add(quantity);
        Ok(())
    }
}

// ============================================================================
// Appointment store
// ============================================================================

type SlotKey = (UserId, DateTime<Utc>);

#[derive(Debug, Default)]
struct AppointmentTables {
    records: HashMap<AppointmentId, Appointment>,
    by_buyer: HashMap<UserId, BTreeSet<AppointmentId>>,
    by_seller: HashMap<UserId, BTreeSet<AppointmentId>>,
    by_product: HashMap<ProductId, BTreeSet<AppointmentId>>,
    by_slot: HashMap<SlotKey, BTreeSet<AppointmentId>>,
}

impl AppointmentTables {
    fn slot_holder(&self, seller_id: UserId, scheduled_at: DateTime<Utc>) -> Option<AppointmentId> {
        self.by_slot
            .get(&(seller_id, scheduled_at))?
            .iter()
            .find(|id| {
                self.records
                    .get(id)
                    .is_some_and(|a| a.status.holds_slot())
            })
            .copied()
    }

    fn resolve<'a>(&'a self, ids: Option<&'a BTreeSet<AppointmentId>>) -> impl Iterator<Item = &'a Appointment> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
    }

    fn is_in(&self, id: AppointmentId, status: AppointmentStatus) -> bool {
        self.records.get(&id).is_some_and(|a| a.status == status)
    }

    fn swap(&mut self, expected: AppointmentStatus, next: &Appointment) -> bool {
        let Some(current) = self.records.get_mut(&next.id) else {
            return false;
        };
        if current.status != expected {
            return false;
        }
        current.status = next.status;
        current.cancellation_reason.clone_from(&next.cancellation_reason);
        current.confirmed_at = next.confirmed_at;
        current.completed_at = next.completed_at;
        true
    }
}

fn sort_by_window(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| {
        a.scheduled_at()
            .cmp(&b.scheduled_at())
            .then(a.requested_at.cmp(&b.requested_at))
    });
}

/// Appointments with buyer, seller, product and slot indexes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAppointmentStore {
    tables: Arc<Mutex<AppointmentTables>>,
}

impl InMemoryAppointmentStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appointments for one product, earliest window first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the lock is poisoned.
    pub fn for_product(&self, product_id: ProductId) -> Result<Vec<Appointment>, StorageError> {
        let tables = lock(&self.tables)?;
        let mut found: Vec<Appointment> = tables.resolve(tables.by_product.get(&product_id)).cloned().collect();
        sort_by_window(&mut found);
        Ok(found)
    }

    /// Number of stored appointments.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(lock(&self.tables)?.records.len())
    }

    /// Whether the store holds no appointments.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert(&self, appointment: &Appointment) -> Result<(), StorageError> {
        let mut tables = lock(&self.tables)?;
        if tables.records.contains_key(&appointment.id) {
            return Err(StorageError::Duplicate(format!("appointment {}", appointment.id)));
        }
        let slot = (appointment.seller_id, appointment.scheduled_at());
        if appointment.status.holds_slot() {
            if let Some(holder) = tables.slot_holder(slot.0, slot.1) {
                return Err(StorageError::Duplicate(format!(
                    "seller {} slot {} held by {holder}",
                    slot.0, slot.1
                )));
            }
        }

        let id = appointment.id;
        tables.by_buyer.entry(appointment.buyer_id).or_default().insert(id);
        tables.by_seller.entry(appointment.seller_id).or_default().insert(id);
        tables.by_product.entry(appointment.product_id).or_default().insert(id);
        tables.by_slot.entry(slot).or_default().insert(id);
        tables.records.insert(id, appointment.clone());
        Ok(())
    }

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
        Ok(lock(&self.tables)?.records.get(&id).cloned())
    }

    async fn list(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StorageError> {
        let tables = lock(&self.tables)?;
        let index = match query.role {
            Role::Buyer => tables.by_buyer.get(&query.user_id),
            Role::Seller => tables.by_seller.get(&query.user_id),
        };
        let mut found: Vec<Appointment> = tables
            .resolve(index)
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        sort_by_window(&mut found);
        Ok(found)
    }

    async fn due(
        &self,
        status: AppointmentStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Appointment>, StorageError> {
        let tables = lock(&self.tables)?;
        let mut found: Vec<Appointment> = tables
            .records
            .values()
            .filter(|a| a.status == status && a.scheduled_at() <= cutoff)
            .cloned()
            .collect();
        sort_by_window(&mut found);
        found.truncate(limit);
        Ok(found)
    }

    async fn count_due(&self, status: AppointmentStatus, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        Ok(lock(&self.tables)?
            .records
            .values()
            .filter(|a| a.status == status && a.scheduled_at() <= cutoff)
            .count())
    }

    async fn active_at_slot(
        &self,
        seller_id: UserId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<AppointmentId>, StorageError> {
        Ok(lock(&self.tables)?.slot_holder(seller_id, scheduled_at))
    }

    async fn compare_and_set(
        &self,
        expected: AppointmentStatus,
        next: &Appointment,
    ) -> Result<bool, StorageError> {
        Ok(lock(&self.tables)?.swap(expected, next))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        lock(&self.tables).map(|_| ())
    }
}

// ============================================================================
// Rating ledger
// ============================================================================

type RatingTable = HashMap<AppointmentId, Vec<Rating>>;

fn push_unique(ratings: &mut RatingTable, rating: &Rating) -> Result<(), StorageError> {
    let existing = ratings.entry(rating.appointment_id).or_default();
    if existing.iter().any(|r| r.direction == rating.direction) {
        return Err(StorageError::Duplicate(format!(
            "{} rating for appointment {}",
            rating.direction, rating.appointment_id
        )));
    }
    existing.push(rating.clone());
    Ok(())
}

/// Ratings with a per-appointment index.
///
/// Closing writes and the closable scan also touch the appointment store
/// the ledger was built over. Both locks are always taken appointments
/// first.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRatingLedger {
    ratings: Arc<Mutex<RatingTable>>,
    appointments: InMemoryAppointmentStore,
}

impl InMemoryRatingLedger {
    /// Create an empty ledger over its own empty appointment store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty ledger over `appointments`
    #[must_use]
    pub fn over(appointments: InMemoryAppointmentStore) -> Self {
        Self {
            ratings: Arc::default(),
            appointments,
        }
    }
}

#[async_trait]
impl RatingLedger for InMemoryRatingLedger {
    async fn insert(&self, rating: &Rating) -> Result<(), StorageError> {
        push_unique(&mut *lock(&self.ratings)?, rating)
    }

    async fn insert_closing(&self, rating: &Rating, completed: &Appointment) -> Result<bool, StorageError> {
        let mut tables = lock(&self.appointments.tables)?;
        let mut ratings = lock(&self.ratings)?;
        if !tables.is_in(completed.id, AppointmentStatus::Confirmed) {
            return Ok(false);
        }
        push_unique(&mut ratings, rating)?;
        Ok(tables.swap(AppointmentStatus::Confirmed, completed))
    }

    async fn closable(&self, limit: usize) -> Result<Vec<AppointmentId>, StorageError> {
        let tables = lock(&self.appointments.tables)?;
        let ratings = lock(&self.ratings)?;
        let mut found: Vec<Appointment> = tables
            .records
            .values()
            .filter(|a| a.status == AppointmentStatus::Confirmed)
            .filter(|a| {
                ratings.get(&a.id).is_some_and(|given| {
                    RatingDirection::ALL
                        .iter()
                        .all(|d| given.iter().any(|r| r.direction == *d))
                })
            })
            .cloned()
            .collect();
        sort_by_window(&mut found);
        Ok(found.into_iter().take(limit).map(|a| a.id).collect())
    }

    async fn for_appointment(&self, appointment_id: AppointmentId) -> Result<Vec<Rating>, StorageError> {
        Ok(lock(&self.ratings)?
            .get(&appointment_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn received_by(
        &self,
        user_id: UserId,
        direction: Option<RatingDirection>,
    ) -> Result<Vec<Rating>, StorageError> {
        let ratings = lock(&self.ratings)?;
        let mut received: Vec<Rating> = ratings
            .values()
            .flatten()
            .filter(|r| r.rated_id == user_id && direction.is_none_or(|d| d == r.direction))
            .cloned()
            .collect();
        received.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(received)
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Default)]
struct CatalogTables {
    listings: HashMap<ProductId, Listing>,
    availability: HashMap<UserId, Vec<AvailabilityWindow>>,
}

/// Listings and seller availability.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tables: Arc<Mutex<CatalogTables>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a listing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the lock is poisoned.
    pub fn add_listing(&self, listing: Listing) -> Result<(), StorageError> {
        lock(&self.tables)?.listings.insert(listing.product_id, listing);
        Ok(())
    }

    /// Publish an availability window for a seller.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the lock is poisoned.
    pub fn add_availability(&self, seller_id: UserId, window: AvailabilityWindow) -> Result<(), StorageError> {
        lock(&self.tables)?
            .availability
            .entry(seller_id)
            .or_default()
            .push(window);
        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn listing(&self, product_id: ProductId) -> Result<Option<Listing>, StorageError> {
        Ok(lock(&self.tables)?.listings.get(&product_id).cloned())
    }

    async fn availability(
        &self,
        seller_id: UserId,
        weekday: Weekday,
    ) -> Result<Vec<AvailabilityWindow>, StorageError> {
        Ok(lock(&self.tables)?
            .availability
            .get(&seller_id)
            .map(|windows| windows.iter().filter(|w| w.weekday == weekday).copied().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// Notification outbox
// ============================================================================

/// Emitter that records every notification.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutbox {
    sent: Arc<Mutex<Vec<AppointmentNotification>>>,
}

impl InMemoryOutbox {
    /// Create an empty outbox
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, in delivery order.
    #[must_use]
    pub fn notifications(&self) -> Vec<AppointmentNotification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Notifications addressed to one user.
    #[must_use]
    pub fn for_recipient(&self, recipient: UserId) -> Vec<AppointmentNotification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.recipient == recipient)
            .collect()
    }
}

#[async_trait]
impl NotificationEmitter for InMemoryOutbox {
    async fn emit(&self, notification: &AppointmentNotification) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .map_err(|_| NotificationError::Delivery("outbox lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// Backend bundle
// ============================================================================

/// All four storage adapters, sharing nothing with other bundles.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    /// Stock ledger
    pub stock: InMemoryStockLedger,
    /// Appointment store
    pub appointments: InMemoryAppointmentStore,
    /// Rating ledger
    pub ratings: InMemoryRatingLedger,
    /// Catalog
    pub catalog: InMemoryCatalog,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        let appointments = InMemoryAppointmentStore::new();
        Self {
            stock: InMemoryStockLedger::new(),
            ratings: InMemoryRatingLedger::over(appointments.clone()),
            appointments,
            catalog: InMemoryCatalog::new(),
        }
    }
}

impl InMemoryBackend {
    /// Create empty adapters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine ports backed by these adapters
    #[must_use]
    pub fn ports(&self) -> EnginePorts {
        EnginePorts {
            stock: Arc::new(self.stock.clone()),
            appointments: Arc::new(self.appointments.clone()),
            ratings: Arc::new(self.ratings.clone()),
            catalog: Arc::new(self.catalog.clone()),
        }
    }
}
