//! A small bank-account aggregate used to exercise stores and replay.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use eventide_core::aggregate::{Aggregate, AggregateEvent, AggregateState};
use eventide_core::error::BoxError;
use eventide_core::event::{DomainEvent, Event, EventCast};
use eventide_core::event_map::{EventMap, EventSerializer};
use eventide_core::snapshot::{SnapshotAggregate, SnapshotPolicy};

/// The account was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountOpened {
    /// Account holder.
    pub owner: String,
    /// Business date of the opening.
    pub opened_on: NaiveDate,
}

impl Event for AccountOpened {
    const NAME: &'static str = "account-opened";
}

/// Money was paid in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCredited {
    /// Amount in cents.
    pub amount: i64,
}

impl Event for AccountCredited {
    const NAME: &'static str = "account-credited";
}

/// Money was taken out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDebited {
    /// Amount in cents.
    pub amount: i64,
}

impl Event for AccountDebited {
    const NAME: &'static str = "account-debited";
}

/// The account was closed. Carries no data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountClosed;

impl Event for AccountClosed {
    const NAME: &'static str = "account-closed";
}

/// Stores `opened_on` as a `DD/MM/YYYY` string.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountOpenedSerializer;

const OPENED_ON_FORMAT: &str = "%d/%m/%Y";

impl EventSerializer<AccountOpened> for AccountOpenedSerializer {
    fn serialize(&self, event: &AccountOpened) -> Result<Value, BoxError> {
        Ok(json!({
            "owner": event.owner,
            "openedOn": event.opened_on.format(OPENED_ON_FORMAT).to_string(),
        }))
    }

    fn deserialize(&self, payload: Value) -> Result<AccountOpened, BoxError> {
        let owner = payload["owner"].as_str().ok_or("missing owner")?;
        let opened_on = payload["openedOn"].as_str().ok_or("missing openedOn")?;
        Ok(AccountOpened {
            owner: owner.to_owned(),
            opened_on: NaiveDate::parse_from_str(opened_on, OPENED_ON_FORMAT)?,
        })
    }
}

/// Builds an event map with every account event registered.
///
/// # Panics
///
/// Panics if two account events share a name.
#[must_use]
pub fn account_event_map() -> EventMap {
    let mut map = EventMap::new();
    map.register_with::<AccountOpened>(AccountOpenedSerializer)
        .expect("account-opened registers once");
    map.register::<AccountCredited>()
        .expect("account-credited registers once");
    map.register::<AccountDebited>()
        .expect("account-debited registers once");
    map.register::<AccountClosed>()
        .expect("account-closed registers once");
    map
}

/// Events produced by [`Account`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    /// See [`AccountOpened`].
    Opened(AccountOpened),
    /// See [`AccountCredited`].
    Credited(AccountCredited),
    /// See [`AccountDebited`].
    Debited(AccountDebited),
    /// See [`AccountClosed`].
    Closed(AccountClosed),
}

impl AggregateEvent for AccountEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Opened(_) => AccountOpened::NAME,
            Self::Credited(_) => AccountCredited::NAME,
            Self::Debited(_) => AccountDebited::NAME,
            Self::Closed(_) => AccountClosed::NAME,
        }
    }

    fn into_domain_event(self) -> Box<dyn DomainEvent> {
        match self {
            Self::Opened(e) => Box::new(e),
            Self::Credited(e) => Box::new(e),
            Self::Debited(e) => Box::new(e),
            Self::Closed(e) => Box::new(e),
        }
    }

    fn from_domain_event(event: Box<dyn DomainEvent>) -> Option<Self> {
        EventCast::new(event)
            .case(Self::Opened)
            .case(Self::Credited)
            .case(Self::Debited)
            .case(Self::Closed)
            .finish()
    }
}

/// Snapshot state of an [`Account`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Account holder.
    pub owner: Option<String>,
    /// Balance in cents.
    pub balance: i64,
    /// Whether the account is closed.
    pub closed: bool,
}

/// Bank account aggregate. Snapshotted every five events.
#[derive(Debug)]
pub struct Account {
    id: String,
    owner: Option<String>,
    balance: i64,
    closed: bool,
    state: AggregateState<AccountEvent>,
}

impl Account {
    /// Opens a new account.
    #[must_use]
    pub fn open(id: impl Into<String>, owner: impl Into<String>, opened_on: NaiveDate) -> Self {
        let mut account = Self::with_id(id.into());
        account.apply(AccountEvent::Opened(AccountOpened {
            owner: owner.into(),
            opened_on,
        }));
        account
    }

    /// Pays `amount` in.
    pub fn credit(&mut self, amount: i64) {
        self.apply(AccountEvent::Credited(AccountCredited { amount }));
    }

    /// Takes `amount` out.
    pub fn debit(&mut self, amount: i64) {
        self.apply(AccountEvent::Debited(AccountDebited { amount }));
    }

    /// Closes the account.
    pub fn close(&mut self) {
        self.apply(AccountEvent::Closed(AccountClosed));
    }

    /// Account holder, once opened.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Balance in cents.
    #[must_use]
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Whether the account is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Aggregate for Account {
    const STREAM_NAME: &'static str = "account";
    type Id = String;
    type Event = AccountEvent;

    fn with_id(id: String) -> Self {
        Self {
            id,
            owner: None,
            balance: 0,
            closed: false,
            state: AggregateState::new(),
        }
    }

    fn id(&self) -> &String {
        &self.id
    }

    fn state(&self) -> &AggregateState<AccountEvent> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AggregateState<AccountEvent> {
        &mut self.state
    }

    fn handle(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::Opened(e) => self.owner = Some(e.owner.clone()),
            AccountEvent::Credited(e) => self.balance += e.amount,
            AccountEvent::Debited(e) => self.balance -= e.amount,
            AccountEvent::Closed(_) => self.closed = true,
        }
    }
}

impl SnapshotAggregate for Account {
    type Snapshot = AccountSnapshot;

    fn snapshot_policy() -> SnapshotPolicy {
        SnapshotPolicy::every(5)
    }

    fn create_snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            owner: self.owner.clone(),
            balance: self.balance,
            closed: self.closed,
        }
    }

    fn load_snapshot(&mut self, snapshot: AccountSnapshot) {
        self.owner = snapshot.owner;
        self.balance = snapshot.balance;
        self.closed = snapshot.closed;
    }
}
