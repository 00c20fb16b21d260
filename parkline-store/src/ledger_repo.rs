use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parkline_billing::BillingCalculator;
use parkline_core::{
    Occupant, ParkError, ParkResult, PaymentStatus, Reservation, RevenueSummary, Session,
    SessionKind, Slot, SlotId, SlotLedger, SlotState, SlotStatus,
};
use parkline_shared::Masked;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::database::DbClient;

/// The ledger backed by the `slots` and `sessions` tables.
pub struct SqliteLedger {
    pool: SqlitePool,
    billing: BillingCalculator,
}

impl SqliteLedger {
    pub fn new(db: &DbClient, billing: BillingCalculator) -> Self {
        Self {
            pool: db.pool.clone(),
            billing,
        }
    }
}

const SLOT_COLUMNS: &str = "slot_id, status, vehicle_number, user_email, user_phone, \
     entry_time, arrival_deadline, reserved_duration_hours";

const SESSION_COLUMNS: &str = "id, slot_id, kind, vehicle_number, user_email, user_phone, \
     entry_time, exit_time, duration_minutes, base_charge, variable_charge, total_amount, \
     payment_status, created_at";

const CLEAR_SLOT: &str = "status = 'EMPTY', vehicle_number = NULL, user_email = NULL, \
     user_phone = NULL, entry_time = NULL, arrival_deadline = NULL, reserved_duration_hours = NULL";

#[derive(sqlx::FromRow)]
struct SlotRow {
    slot_id: i64,
    status: String,
    vehicle_number: Option<String>,
    user_email: Option<String>,
    user_phone: Option<String>,
    entry_time: Option<i64>,
    arrival_deadline: Option<i64>,
    reserved_duration_hours: Option<f64>,
}

impl SlotRow {
    fn into_slot(self) -> ParkResult<Slot> {
        let slot_id = SlotId::new(self.slot_id)?;
        let occupant = match (self.vehicle_number, self.user_email, self.user_phone) {
            (Some(vehicle_number), Some(user_email), Some(user_phone)) => Some(Occupant {
                vehicle_number,
                user_email,
                user_phone,
            }),
            _ => None,
        };

        let state = match self.status.parse::<SlotStatus>()? {
            SlotStatus::Empty => SlotState::Empty,
            SlotStatus::Reserved => SlotState::Reserved {
                occupant: occupant.ok_or_else(|| corrupt(slot_id, "reserved without occupant"))?,
                reservation: Reservation {
                    arrival_deadline: self.arrival_deadline.map(from_epoch).transpose()?,
                    reserved_duration_hours: self
                        .reserved_duration_hours
                        .ok_or_else(|| corrupt(slot_id, "reserved without duration"))?,
                },
            },
            SlotStatus::Occupied => SlotState::Occupied {
                occupant,
                entry_time: self
                    .entry_time
                    .map(from_epoch)
                    .transpose()?
                    .ok_or_else(|| corrupt(slot_id, "occupied without entry time"))?,
            },
        };

        Ok(Slot { slot_id, state })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    slot_id: i64,
    kind: String,
    vehicle_number: Option<String>,
    user_email: Option<String>,
    user_phone: Option<String>,
    entry_time: i64,
    exit_time: i64,
    duration_minutes: i64,
    base_charge: f64,
    variable_charge: f64,
    total_amount: f64,
    payment_status: String,
    created_at: i64,
}

impl SessionRow {
    fn into_session(self) -> ParkResult<Session> {
        Ok(Session {
            id: self.id,
            slot_id: SlotId::new(self.slot_id)?,
            kind: self.kind.parse()?,
            vehicle_number: self.vehicle_number,
            user_email: self.user_email,
            user_phone: self.user_phone,
            entry_time: from_epoch(self.entry_time)?,
            exit_time: from_epoch(self.exit_time)?,
            duration_minutes: self.duration_minutes,
            base_charge: self.base_charge,
            variable_charge: self.variable_charge,
            total_amount: self.total_amount,
            payment_status: self.payment_status.parse()?,
            created_at: from_epoch(self.created_at)?,
        })
    }
}

/// A session about to be written; the id comes from the insert.
struct NewSession {
    slot_id: SlotId,
    kind: SessionKind,
    occupant: Option<Occupant>,
    entry_time: DateTime<Utc>,
    exit_time: DateTime<Utc>,
    bill: parkline_billing::Bill,
}

fn store_err(err: sqlx::Error) -> ParkError {
    ParkError::store(err)
}

fn corrupt(slot_id: SlotId, detail: &str) -> ParkError {
    ParkError::Store(format!("slot {} row is inconsistent: {}", slot_id, detail).into())
}

fn to_epoch(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

fn from_epoch(secs: i64) -> ParkResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ParkError::Store(format!("timestamp {} out of range", secs).into()))
}

/// Timestamps are stored with whole-second precision.
fn truncate(t: DateTime<Utc>) -> ParkResult<DateTime<Utc>> {
    from_epoch(to_epoch(t))
}

/// Take the write lock on a slot row for the rest of the transaction, so the
/// read that follows cannot be invalidated by another writer.
async fn lock_slot(conn: &mut SqliteConnection, slot_id: SlotId) -> ParkResult<()> {
    sqlx::query("UPDATE slots SET updated_at = ? WHERE slot_id = ?")
        .bind(to_epoch(Utc::now()))
        .bind(i64::from(slot_id))
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;
    Ok(())
}

async fn fetch_slot(conn: &mut SqliteConnection, slot_id: SlotId) -> ParkResult<Slot> {
    let query = format!("SELECT {} FROM slots WHERE slot_id = ?", SLOT_COLUMNS);
    let row: Option<SlotRow> = sqlx::query_as(&query)
        .bind(i64::from(slot_id))
        .fetch_optional(&mut *conn)
        .await
        .map_err(store_err)?;

    row.ok_or_else(|| ParkError::NotFound(format!("slot {}", slot_id)))?
        .into_slot()
}

async fn clear_slot(conn: &mut SqliteConnection, slot_id: SlotId) -> ParkResult<()> {
    let query = format!("UPDATE slots SET {}, updated_at = ? WHERE slot_id = ?", CLEAR_SLOT);
    sqlx::query(&query)
        .bind(to_epoch(Utc::now()))
        .bind(i64::from(slot_id))
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;
    Ok(())
}

async fn insert_session(conn: &mut SqliteConnection, new: NewSession) -> ParkResult<Session> {
    let created_at = truncate(Utc::now())?;
    let (vehicle_number, user_email, user_phone) = match new.occupant {
        Some(o) => (Some(o.vehicle_number), Some(o.user_email), Some(o.user_phone)),
        None => (None, None, None),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO sessions
            (slot_id, kind, vehicle_number, user_email, user_phone, entry_time, exit_time,
             duration_minutes, base_charge, variable_charge, total_amount, payment_status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'PENDING', ?)
        "#,
    )
    .bind(i64::from(new.slot_id))
    .bind(new.kind.as_str())
    .bind(&vehicle_number)
    .bind(&user_email)
    .bind(&user_phone)
    .bind(to_epoch(new.entry_time))
    .bind(to_epoch(new.exit_time))
    .bind(new.bill.duration_minutes)
    .bind(new.bill.base_charge)
    .bind(new.bill.variable_charge)
    .bind(new.bill.total_amount)
    .bind(to_epoch(created_at))
    .execute(&mut *conn)
    .await
    .map_err(store_err)?;

    Ok(Session {
        id: result.last_insert_rowid(),
        slot_id: new.slot_id,
        kind: new.kind,
        vehicle_number,
        user_email,
        user_phone,
        entry_time: new.entry_time,
        exit_time: new.exit_time,
        duration_minutes: new.bill.duration_minutes,
        base_charge: new.bill.base_charge,
        variable_charge: new.bill.variable_charge,
        total_amount: new.bill.total_amount,
        payment_status: PaymentStatus::Pending,
        created_at,
    })
}

#[async_trait]
impl SlotLedger for SqliteLedger {
    async fn get(&self, slot_id: SlotId) -> ParkResult<Slot> {
        let mut conn = self.pool.acquire().await.map_err(store_err)?;
        fetch_slot(&mut conn, slot_id).await
    }

    async fn list(&self) -> ParkResult<Vec<Slot>> {
        let query = format!("SELECT {} FROM slots ORDER BY slot_id", SLOT_COLUMNS);
        let rows: Vec<SlotRow> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.into_iter().map(SlotRow::into_slot).collect()
    }

    async fn reserve(
        &self,
        slot_id: SlotId,
        occupant: &Occupant,
        reservation: &Reservation,
    ) -> ParkResult<bool> {
        // Guard and write in one statement: concurrent reservations race on the
        // row lock and only the first sees status = 'EMPTY'.
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET status = 'RESERVED', vehicle_number = ?, user_email = ?, user_phone = ?,
                arrival_deadline = ?, reserved_duration_hours = ?, entry_time = NULL, updated_at = ?
            WHERE slot_id = ? AND status = 'EMPTY'
            "#,
        )
        .bind(&occupant.vehicle_number)
        .bind(&occupant.user_email)
        .bind(&occupant.user_phone)
        .bind(reservation.arrival_deadline.map(to_epoch))
        .bind(reservation.reserved_duration_hours)
        .bind(to_epoch(Utc::now()))
        .bind(i64::from(slot_id))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        let reserved = result.rows_affected() > 0;
        if reserved {
            info!(
                slot_id = %slot_id,
                vehicle = %occupant.vehicle_number,
                email = %Masked(&occupant.user_email),
                "Slot reserved"
            );
        }
        Ok(reserved)
    }

    async fn cancel(
        &self,
        slot_id: SlotId,
        email: &str,
        at: DateTime<Utc>,
    ) -> ParkResult<Option<Session>> {
        let at = truncate(at)?;
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        lock_slot(&mut tx, slot_id).await?;

        let (occupant, reservation) = match fetch_slot(&mut tx, slot_id).await?.state {
            SlotState::Reserved {
                occupant,
                reservation,
            } => (occupant, reservation),
            other => {
                return Err(ParkError::PreconditionFailed(format!(
                    "slot {} is not reserved (status {})",
                    slot_id,
                    other.status().as_str()
                )))
            }
        };

        // Dropping the transaction releases the lock without touching the row.
        if !occupant.email_matches(email) {
            warn!(
                slot_id = %slot_id,
                requested_by = %Masked(email),
                "Cancel refused, email does not match reservation"
            );
            return Err(ParkError::PreconditionFailed(
                "email does not match reservation".to_string(),
            ));
        }

        let fee = match self.billing.cancellation_fee(reservation.reserved_duration_hours)? {
            Some(bill) => Some(
                insert_session(
                    &mut tx,
                    NewSession {
                        slot_id,
                        kind: SessionKind::CancellationFee,
                        occupant: Some(occupant),
                        entry_time: at,
                        exit_time: at,
                        bill,
                    },
                )
                .await?,
            ),
            None => None,
        };

        clear_slot(&mut tx, slot_id).await?;
        tx.commit().await.map_err(store_err)?;

        match &fee {
            Some(session) => info!(
                slot_id = %slot_id,
                session_id = session.id,
                amount = session.total_amount,
                "Reservation cancelled with fee"
            ),
            None => info!(slot_id = %slot_id, "Reservation cancelled"),
        }
        Ok(fee)
    }

    async fn expire_overdue_reservations(&self, now: DateTime<Utc>) -> ParkResult<u64> {
        let query = format!(
            "UPDATE slots SET {}, updated_at = ? \
             WHERE status = 'RESERVED' AND arrival_deadline IS NOT NULL AND arrival_deadline < ?",
            CLEAR_SLOT
        );
        let result = sqlx::query(&query)
            .bind(to_epoch(Utc::now()))
            .bind(to_epoch(now))
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        let expired = result.rows_affected();
        if expired > 0 {
            info!(count = expired, "Expired overdue reservations");
        }
        Ok(expired)
    }

    async fn occupy(&self, slot_id: SlotId, entry_time: DateTime<Utc>) -> ParkResult<()> {
        // Occupant columns are left as they are: a reserved driver carries over,
        // an empty slot stays anonymous until payer details are attached.
        sqlx::query(
            r#"
            UPDATE slots
            SET status = 'OCCUPIED', entry_time = ?, arrival_deadline = NULL,
                reserved_duration_hours = NULL, updated_at = ?
            WHERE slot_id = ?
            "#,
        )
        .bind(to_epoch(entry_time))
        .bind(to_epoch(Utc::now()))
        .bind(i64::from(slot_id))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        info!(slot_id = %slot_id, entry_time = %entry_time, "Slot occupied");
        Ok(())
    }

    async fn occupy_if_vacant(&self, slot_id: SlotId, entry_time: DateTime<Utc>) -> ParkResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET status = 'OCCUPIED', entry_time = ?, arrival_deadline = NULL,
                reserved_duration_hours = NULL, updated_at = ?
            WHERE slot_id = ? AND status <> 'OCCUPIED'
            "#,
        )
        .bind(to_epoch(entry_time))
        .bind(to_epoch(Utc::now()))
        .bind(i64::from(slot_id))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        let occupied = result.rows_affected() > 0;
        if occupied {
            info!(slot_id = %slot_id, entry_time = %entry_time, "Slot occupied");
        }
        Ok(occupied)
    }

    async fn attach_payer_details(&self, slot_id: SlotId, occupant: &Occupant) -> ParkResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET vehicle_number = ?, user_email = ?, user_phone = ?, updated_at = ?
            WHERE slot_id = ? AND status = 'OCCUPIED'
            "#,
        )
        .bind(&occupant.vehicle_number)
        .bind(&occupant.user_email)
        .bind(&occupant.user_phone)
        .bind(to_epoch(Utc::now()))
        .bind(i64::from(slot_id))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn vacate(&self, slot_id: SlotId, exit_time: DateTime<Utc>) -> ParkResult<Option<Session>> {
        let exit_time = truncate(exit_time)?;
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        lock_slot(&mut tx, slot_id).await?;

        let (occupant, entry_time) = match fetch_slot(&mut tx, slot_id).await?.state {
            SlotState::Occupied {
                occupant,
                entry_time,
            } => (occupant, entry_time),
            _ => {
                debug!(slot_id = %slot_id, "Nothing to vacate");
                return Ok(None);
            }
        };

        // A failed bill drops the transaction, leaving the slot occupied.
        let bill = self.billing.live_parking(entry_time, exit_time)?;

        let session = insert_session(
            &mut tx,
            NewSession {
                slot_id,
                kind: SessionKind::Parking,
                occupant,
                entry_time,
                exit_time,
                bill,
            },
        )
        .await?;

        clear_slot(&mut tx, slot_id).await?;
        tx.commit().await.map_err(store_err)?;

        info!(
            slot_id = %slot_id,
            session_id = session.id,
            minutes = session.duration_minutes,
            amount = session.total_amount,
            "Slot vacated"
        );
        Ok(Some(session))
    }

    async fn mark_paid(&self, session_id: i64) -> ParkResult<()> {
        let result = sqlx::query("UPDATE sessions SET payment_status = 'PAID' WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(ParkError::NotFound(format!("session {}", session_id)));
        }
        info!(session_id, "Session marked as paid");
        Ok(())
    }

    async fn get_session(&self, session_id: i64) -> ParkResult<Session> {
        let query = format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS);
        let row: Option<SessionRow> = sqlx::query_as(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.ok_or_else(|| ParkError::NotFound(format!("session {}", session_id)))?
            .into_session()
    }

    async fn list_sessions(
        &self,
        status: Option<PaymentStatus>,
        limit: Option<u32>,
    ) -> ParkResult<Vec<Session>> {
        // SQLite treats a negative LIMIT as "no limit".
        let query = format!(
            "SELECT {} FROM sessions WHERE (?1 IS NULL OR payment_status = ?1) \
             ORDER BY id DESC LIMIT ?2",
            SESSION_COLUMNS
        );
        let rows: Vec<SessionRow> = sqlx::query_as(&query)
            .bind(status.map(|s| s.as_str()))
            .bind(limit.map(i64::from).unwrap_or(-1))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    async fn revenue_summary(&self) -> ParkResult<RevenueSummary> {
        let (total_amount, count): (f64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(total_amount), 0.0), COUNT(*) FROM sessions WHERE payment_status = 'PAID'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(RevenueSummary {
            total_amount,
            count,
        })
    }

    async fn reset_all(&self) -> ParkResult<()> {
        let query = format!("UPDATE slots SET {}, updated_at = ?", CLEAR_SLOT);
        sqlx::query(&query)
            .bind(to_epoch(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        info!("All slots reset to EMPTY");
        Ok(())
    }

    async fn clear_sessions(&self) -> ParkResult<u64> {
        let result = sqlx::query("DELETE FROM sessions")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        info!(count = result.rows_affected(), "Session history cleared");
        Ok(result.rows_affected())
    }
}
