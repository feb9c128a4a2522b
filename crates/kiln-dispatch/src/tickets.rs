//! Ticket-based worker pool for a dynamic set of processes.
//!
//! Each process stamps a ticket from a shared pool stored on disk. Work for
//! a named case is split across the tickets stamped at the moment the case is
//! first opened; that snapshot never changes afterwards, so late joiners sit
//! out cases that are already running.
//!
//! Layout under the pool directory:
//! - `users.json`: the live [`TicketPool`]
//! - `cases/<case>.json`: one snapshot per case

use crate::distribute::{Assignment, DistributeOptions, distribute};
use crate::error::{DispatchError, DispatchResult};
use crate::toggle::Toggle;
use kiln_store::{JsonDocument, KeyedDocuments, SerdeFormat, clear_dir};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const POOL_FILE: &str = "users.json";
const CASES_DIR: &str = "cases";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPool {
    pub available_tickets: Vec<u64>,
    pub used_tickets: BTreeSet<u64>,
}

impl TicketPool {
    /// A fresh pool with tickets `0..workers`.
    #[must_use]
    pub fn with_workers(workers: u64) -> Self {
        Self { available_tickets: (0..workers).collect(), used_tickets: BTreeSet::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicPoolOptions {
    /// Number of tickets to issue. `None` keeps whatever is on disk.
    pub workers: Option<u64>,
    /// Reissue tickets even if a pool already exists.
    pub overwrite: bool,
    /// Wipe the pool directory, cases included, before opening.
    pub reset: bool,
    pub enabled: bool,
}

impl Default for DynamicPoolOptions {
    fn default() -> Self {
        Self { workers: None, overwrite: false, reset: false, enabled: true }
    }
}

impl DynamicPoolOptions {
    #[must_use]
    pub fn workers(workers: u64) -> Self {
        Self { workers: Some(workers), ..Self::default() }
    }
}

type TicketDocument = JsonDocument<SerdeFormat<TicketPool>>;

pub struct DynamicPool {
    root: PathBuf,
    pool: TicketDocument,
    cases: KeyedDocuments<SerdeFormat<TicketPool>>,
    current_ticket: Option<u64>,
    enabled: bool,
}

impl DynamicPool {
    pub fn open(path: impl Into<PathBuf>, options: DynamicPoolOptions) -> DispatchResult<Self> {
        let root = path.into();
        if options.reset {
            clear_dir(&root)?;
            info!(path = %root.display(), "ticket pool reset");
        }
        std::fs::create_dir_all(&root)?;

        let pool = Self {
            pool: JsonDocument::serde(root.join(POOL_FILE)),
            cases: KeyedDocuments::new(root.join(CASES_DIR), SerdeFormat::new()),
            root,
            current_ticket: None,
            enabled: options.enabled,
        };

        if let Some(workers) = options.workers {
            let fresh = TicketPool::with_workers(workers);
            if options.overwrite {
                pool.pool.update(false, |tickets| {
                    *tickets = fresh;
                    Ok::<_, DispatchError>(())
                })?;
                info!(workers, "ticket pool reissued");
            } else {
                pool.pool.load_or_init(false, || fresh.clone())?;
            }
        }

        Ok(pool)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Take the next available ticket for this process.
    pub fn stamp(&mut self) -> DispatchResult<u64> {
        let ticket = self.pool.update(false, |tickets| {
            if tickets.available_tickets.is_empty() {
                return Err(DispatchError::EmptyPool);
            }
            let ticket = tickets.available_tickets.remove(0);
            tickets.used_tickets.insert(ticket);
            Ok(ticket)
        })?;

        self.current_ticket = Some(ticket);
        info!(ticket, path = %self.pool.path().display(), "ticket stamped");
        Ok(ticket)
    }

    #[must_use]
    pub fn current_ticket(&self) -> Option<u64> {
        self.current_ticket
    }

    #[must_use]
    pub fn is_stamped(&self) -> bool {
        self.current_ticket.is_some()
    }

    /// The live pool as persisted.
    pub fn tickets(&self) -> DispatchResult<TicketPool> {
        Ok(self.pool.load(false)?)
    }

    pub fn available_tickets(&self) -> DispatchResult<Vec<u64>> {
        Ok(self.tickets()?.available_tickets)
    }

    pub fn used_tickets(&self) -> DispatchResult<BTreeSet<u64>> {
        Ok(self.tickets()?.used_tickets)
    }

    /// Names of all opened cases.
    pub fn cases(&self) -> DispatchResult<Vec<String>> {
        Ok(self.cases.keys()?)
    }

    /// The case's snapshot, taken from the live pool on first use.
    pub fn open_case(&self, case_name: &str) -> DispatchResult<TicketPool> {
        let doc = self.cases.document(case_name);
        if doc.exists() {
            return Ok(doc.load(false)?);
        }

        let snapshot = self.tickets()?;
        // Another process may win the race; its snapshot is the one kept.
        let opened = doc.load_or_init(false, || snapshot.clone())?;
        info!(case = case_name, tickets = ?opened.used_tickets, "case opened");
        Ok(opened)
    }

    /// Partition `items` across the tickets admitted to `case_name`.
    pub fn distribute<T>(
        &self,
        case_name: &str,
        items: impl IntoIterator<Item = T>,
        options: DistributeOptions<'_, u64, T>,
    ) -> DispatchResult<Assignment<u64, T>> {
        let snapshot = self.open_case(case_name)?;
        if let Some(unknown) = options.assigned_keys().find(|ticket| !snapshot.used_tickets.contains(*ticket)) {
            return Err(DispatchError::Config(format!(
                "preassigned ticket {unknown} is not part of case `{case_name}` (tickets {:?})",
                snapshot.used_tickets
            )));
        }

        let keys: Vec<u64> = snapshot.used_tickets.into_iter().collect();
        distribute(&keys, items, options)
    }

    /// This process's share of `items` for `case_name`.
    ///
    /// Returns everything when the pool is disabled, and nothing when this
    /// process holds no ticket admitted to the case.
    pub fn get_iterable<T>(&self, case_name: &str, items: Vec<T>) -> DispatchResult<Vec<T>> {
        let snapshot = self.open_case(case_name)?;
        if !self.enabled {
            return Ok(items);
        }

        let Some(ticket) = self.current_ticket.filter(|t| snapshot.used_tickets.contains(t)) else {
            debug!(case = case_name, ticket = ?self.current_ticket, "ticket not admitted to case");
            return Ok(Vec::new());
        };

        let mut assignment = self.distribute(case_name, items, DistributeOptions::default())?;
        let share = assignment.shift_remove(&ticket).unwrap_or_default();
        debug!(case = case_name, ticket, items = share.len(), "dynamic pool share");
        Ok(share)
    }
}

impl Toggle for DynamicPool {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl fmt::Display for DynamicPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tickets() {
            Ok(tickets) => write!(
                f,
                "DynamicPool(available_tickets={:?}, current_ticket={:?}, used_tickets={:?})",
                tickets.available_tickets, self.current_ticket, tickets.used_tickets
            ),
            Err(err) => write!(f, "DynamicPool(unreadable: {err})"),
        }
    }
}

impl fmt::Debug for DynamicPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicPool")
            .field("root", &self.root)
            .field("current_ticket", &self.current_ticket)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
