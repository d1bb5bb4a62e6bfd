//! PostgreSQL backend.
//!
//! Plain statements are written as SQL; the ledger queries, whose WHERE clause
//! depends on the filter, are assembled with SeaQuery. Unique constraints and
//! the partial index on inflow receipts live in the schema (see
//! [`crate::migration::schema`]).

use super::value_conversion::with_converted_params;
use super::{
    CertificateStore, FeeStore, Store, StoreError, StoreResult, StudentStore, TransactionStore,
    UserStore,
};
use crate::connection::{connect, ConnectionError};
use crate::executor::{MayPostgresExecutor, SqlExecutor};
use crate::model::{
    Agent, Certificate, FeeSchedule, LedgerTotals, Role, Sex, Student, Transaction,
    TransactionFilter, TransactionKind, User,
};
use may_postgres::types::{FromSql, ToSql};
use may_postgres::Row;
use sea_query::{Condition, Expr, ExprTrait, Order, PostgresQueryBuilder, Query, SelectStatement};
use uuid::Uuid;

const STUDENT_COLUMNS: [&str; 12] = [
    "id",
    "last_name",
    "first_name",
    "birth_date",
    "birth_place",
    "sex",
    "contact",
    "matricule",
    "class_name",
    "school_year",
    "created_at",
    "updated_at",
];

const TRANSACTION_COLUMNS: [&str; 14] = [
    "id",
    "kind",
    "reference",
    "amount",
    "date",
    "created_by",
    "student_id",
    "student_name",
    "receipt",
    "motive",
    "category",
    "description",
    "created_at",
    "updated_at",
];

const SELECT_STUDENT: &str = "SELECT id, last_name, first_name, birth_date, birth_place, sex, \
     contact, matricule, class_name, school_year, created_at, updated_at FROM students";

const SELECT_FEE: &str =
    "SELECT id, class_name, school_year, amount, created_at FROM fee_schedules";

const SELECT_TRANSACTION: &str = "SELECT id, kind, reference, amount, date, created_by, \
     student_id, student_name, receipt, motive, category, description, created_at, updated_at \
     FROM transactions";

const SELECT_CERTIFICATE: &str = "SELECT id, code, student_id, student_name, class_name, \
     matricule, first_enrollment_date, delivery_date, created_at FROM certificates";

const SELECT_USER: &str =
    "SELECT id, username, password_hash, display_name, role, created_at FROM users";

const SELECT_AGENT: &str =
    "SELECT id, user_id, last_name, first_name, function, active, created_at FROM agents";

pub struct PgStore {
    executor: Box<dyn SqlExecutor>,
}

impl PgStore {
    pub fn new(executor: impl SqlExecutor + 'static) -> Self {
        Self {
            executor: Box::new(executor),
        }
    }

    /// Connect with a single `may_postgres` client.
    pub fn connect(url: &str) -> Result<Self, ConnectionError> {
        Ok(Self::new(MayPostgresExecutor::new(connect(url)?)))
    }

    pub fn executor(&self) -> &dyn SqlExecutor {
        self.executor.as_ref()
    }

    fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> StoreResult<u64> {
        Ok(self.executor.execute(sql, params)?)
    }

    fn fetch<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        map: fn(&Row) -> StoreResult<T>,
    ) -> StoreResult<Vec<T>> {
        self.executor.query_all(sql, params)?.iter().map(map).collect()
    }

    fn fetch_opt<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        map: fn(&Row) -> StoreResult<T>,
    ) -> StoreResult<Option<T>> {
        self.executor
            .query_opt(sql, params)?
            .as_ref()
            .map(map)
            .transpose()
    }

    fn fetch_built<T>(
        &self,
        query: &SelectStatement,
        map: fn(&Row) -> StoreResult<T>,
    ) -> StoreResult<Vec<T>> {
        let (sql, values) = query.build(PostgresQueryBuilder);
        let rows = with_converted_params(&values, |params| self.executor.query_all(&sql, params))?;
        rows.iter().map(map).collect()
    }
}

fn col<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> StoreResult<T> {
    row.try_get(name)
        .map_err(|e| StoreError::Parse(format!("column {name}: {e}")))
}

fn student_from_row(row: &Row) -> StoreResult<Student> {
    let sex: String = col(row, "sex")?;
    Ok(Student {
        id: col(row, "id")?,
        last_name: col(row, "last_name")?,
        first_name: col(row, "first_name")?,
        birth_date: col(row, "birth_date")?,
        birth_place: col(row, "birth_place")?,
        sex: Sex::parse(&sex).ok_or_else(|| StoreError::Parse(format!("sex {sex:?}")))?,
        contact: col(row, "contact")?,
        matricule: col(row, "matricule")?,
        class_name: col(row, "class_name")?,
        school_year: col(row, "school_year")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn fee_from_row(row: &Row) -> StoreResult<FeeSchedule> {
    Ok(FeeSchedule {
        id: col(row, "id")?,
        class_name: col(row, "class_name")?,
        school_year: col(row, "school_year")?,
        amount: col(row, "amount")?,
        created_at: col(row, "created_at")?,
    })
}

fn transaction_from_row(row: &Row) -> StoreResult<Transaction> {
    let kind: String = col(row, "kind")?;
    Ok(Transaction {
        id: col(row, "id")?,
        kind: TransactionKind::parse(&kind)
            .ok_or_else(|| StoreError::Parse(format!("kind {kind:?}")))?,
        reference: col(row, "reference")?,
        amount: col(row, "amount")?,
        date: col(row, "date")?,
        created_by: col(row, "created_by")?,
        student_id: col(row, "student_id")?,
        student_name: col(row, "student_name")?,
        receipt: col(row, "receipt")?,
        motive: col(row, "motive")?,
        category: col(row, "category")?,
        description: col(row, "description")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn certificate_from_row(row: &Row) -> StoreResult<Certificate> {
    Ok(Certificate {
        id: col(row, "id")?,
        code: col(row, "code")?,
        student_id: col(row, "student_id")?,
        student_name: col(row, "student_name")?,
        class_name: col(row, "class_name")?,
        matricule: col(row, "matricule")?,
        first_enrollment_date: col(row, "first_enrollment_date")?,
        delivery_date: col(row, "delivery_date")?,
        created_at: col(row, "created_at")?,
    })
}

fn user_from_row(row: &Row) -> StoreResult<User> {
    let role: String = col(row, "role")?;
    Ok(User {
        id: col(row, "id")?,
        username: col(row, "username")?,
        password_hash: col(row, "password_hash")?,
        display_name: col(row, "display_name")?,
        role: Role::parse(&role).ok_or_else(|| StoreError::Parse(format!("role {role:?}")))?,
        created_at: col(row, "created_at")?,
    })
}

fn agent_from_row(row: &Row) -> StoreResult<Agent> {
    Ok(Agent {
        id: col(row, "id")?,
        user_id: col(row, "user_id")?,
        last_name: col(row, "last_name")?,
        first_name: col(row, "first_name")?,
        function: col(row, "function")?,
        active: col(row, "active")?,
        created_at: col(row, "created_at")?,
    })
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn filter_condition(filter: &TransactionFilter) -> Condition {
    let mut cond = Condition::all();
    if let Some(kind) = filter.kind {
        cond = cond.add(Expr::col("kind").eq(kind.as_str()));
    }
    if let Some(student_id) = filter.student_id {
        cond = cond.add(Expr::col("student_id").eq(student_id));
    }
    if let Some(from) = filter.from {
        cond = cond.add(Expr::col("date").gte(from));
    }
    if let Some(until) = filter.until {
        cond = cond.add(Expr::col("date").lt(until));
    }
    cond
}

fn student_row_values(s: &Student) -> Vec<Expr> {
    vec![
        s.id.into(),
        s.last_name.clone().into(),
        s.first_name.clone().into(),
        s.birth_date.clone().into(),
        s.birth_place.clone().into(),
        s.sex.as_str().into(),
        s.contact.clone().into(),
        s.matricule.clone().into(),
        s.class_name.clone().into(),
        s.school_year.clone().into(),
        s.created_at.into(),
        s.updated_at.into(),
    ]
}

impl StudentStore for PgStore {
    fn insert_student(&self, student: &Student) -> StoreResult<()> {
        self.insert_students(std::slice::from_ref(student))
    }

    fn insert_students(&self, students: &[Student]) -> StoreResult<()> {
        if students.is_empty() {
            return Ok(());
        }
        // One multi-row statement: either every row lands or none does.
        let mut insert = Query::insert();
        insert.into_table("students").columns(STUDENT_COLUMNS);
        for s in students {
            insert
                .values(student_row_values(s))
                .map_err(|e| StoreError::Parse(e.to_string()))?;
        }
        let (sql, values) = insert.build(PostgresQueryBuilder);
        with_converted_params(&values, |params| self.executor.execute(&sql, params))?;
        Ok(())
    }

    fn get_student(&self, id: Uuid) -> StoreResult<Option<Student>> {
        let sql = format!("{SELECT_STUDENT} WHERE id = $1");
        self.fetch_opt(&sql, &[&id], student_from_row)
    }

    fn update_student(&self, s: &Student) -> StoreResult<()> {
        let sql = "UPDATE students SET last_name = $2, first_name = $3, birth_date = $4, \
                   birth_place = $5, sex = $6, contact = $7, matricule = $8, class_name = $9, \
                   school_year = $10, updated_at = $11 WHERE id = $1";
        let sex = s.sex.as_str();
        let affected = self.execute(
            sql,
            &[
                &s.id,
                &s.last_name,
                &s.first_name,
                &s.birth_date,
                &s.birth_place,
                &sex,
                &s.contact,
                &s.matricule,
                &s.class_name,
                &s.school_year,
                &s.updated_at,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!("student {}", s.id)));
        }
        Ok(())
    }

    fn delete_student(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.execute("DELETE FROM students WHERE id = $1", &[&id])? > 0)
    }

    fn find_student_by_matricule(&self, matricule: &str) -> StoreResult<Option<Student>> {
        let sql = format!("{SELECT_STUDENT} WHERE matricule = $1");
        self.fetch_opt(&sql, &[&matricule], student_from_row)
    }

    fn search_students(
        &self,
        needle: &str,
        class_year: Option<(&str, &str)>,
        limit: usize,
    ) -> StoreResult<Vec<Student>> {
        let pattern = like_pattern(needle);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        match class_year {
            Some((class_name, school_year)) => {
                let sql = format!(
                    "{SELECT_STUDENT} WHERE class_name = $2 AND school_year = $3 \
                     AND (last_name ILIKE $1 OR first_name ILIKE $1) \
                     ORDER BY last_name, first_name, id LIMIT $4"
                );
                self.fetch(
                    &sql,
                    &[&pattern, &class_name, &school_year, &limit],
                    student_from_row,
                )
            }
            None => {
                let sql = format!(
                    "{SELECT_STUDENT} WHERE last_name ILIKE $1 OR first_name ILIKE $1 \
                     ORDER BY last_name, first_name, id LIMIT $2"
                );
                self.fetch(&sql, &[&pattern, &limit], student_from_row)
            }
        }
    }

    fn students_in_class(&self, class_name: &str) -> StoreResult<Vec<Student>> {
        let sql = format!("{SELECT_STUDENT} WHERE class_name = $1 ORDER BY last_name, first_name");
        self.fetch(&sql, &[&class_name], student_from_row)
    }

    fn class_names(&self) -> StoreResult<Vec<String>> {
        self.fetch(
            "SELECT DISTINCT class_name FROM students ORDER BY class_name",
            &[],
            |row| col(row, "class_name"),
        )
    }

    fn headcount(&self, school_year: Option<&str>) -> StoreResult<Vec<(String, u64)>> {
        let map = |row: &Row| -> StoreResult<(String, u64)> {
            let count: i64 = col(row, "count")?;
            Ok((col(row, "class_name")?, u64::try_from(count).unwrap_or(0)))
        };
        match school_year {
            Some(year) => self.fetch(
                "SELECT class_name, COUNT(*) AS count FROM students WHERE school_year = $1 \
                 GROUP BY class_name ORDER BY class_name",
                &[&year],
                map,
            ),
            None => self.fetch(
                "SELECT class_name, COUNT(*) AS count FROM students \
                 GROUP BY class_name ORDER BY class_name",
                &[],
                map,
            ),
        }
    }
}

impl FeeStore for PgStore {
    fn insert_fee(&self, fee: &FeeSchedule) -> StoreResult<()> {
        self.execute(
            "INSERT INTO fee_schedules (id, class_name, school_year, amount, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &fee.id,
                &fee.class_name,
                &fee.school_year,
                &fee.amount,
                &fee.created_at,
            ],
        )?;
        Ok(())
    }

    fn list_fees(&self) -> StoreResult<Vec<FeeSchedule>> {
        let sql = format!("{SELECT_FEE} ORDER BY school_year DESC, class_name ASC");
        self.fetch(&sql, &[], fee_from_row)
    }

    fn find_fee(&self, class_name: &str, school_year: &str) -> StoreResult<Option<FeeSchedule>> {
        let sql = format!("{SELECT_FEE} WHERE class_name = $1 AND school_year = $2");
        self.fetch_opt(&sql, &[&class_name, &school_year], fee_from_row)
    }

    fn fees_for_year(&self, school_year: &str) -> StoreResult<Vec<FeeSchedule>> {
        let sql = format!("{SELECT_FEE} WHERE school_year = $1 ORDER BY class_name");
        self.fetch(&sql, &[&school_year], fee_from_row)
    }
}

impl TransactionStore for PgStore {
    fn insert_transaction(&self, t: &Transaction) -> StoreResult<()> {
        let kind = t.kind.as_str();
        self.execute(
            "INSERT INTO transactions (id, kind, reference, amount, date, created_by, student_id, \
             student_name, receipt, motive, category, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            &[
                &t.id,
                &kind,
                &t.reference,
                &t.amount,
                &t.date,
                &t.created_by,
                &t.student_id,
                &t.student_name,
                &t.receipt,
                &t.motive,
                &t.category,
                &t.description,
                &t.created_at,
                &t.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let sql = format!("{SELECT_TRANSACTION} WHERE id = $1");
        self.fetch_opt(&sql, &[&id], transaction_from_row)
    }

    fn update_transaction(&self, t: &Transaction) -> StoreResult<()> {
        let kind = t.kind.as_str();
        let affected = self.execute(
            "UPDATE transactions SET kind = $2, amount = $3, date = $4, student_id = $5, \
             student_name = $6, receipt = $7, motive = $8, category = $9, description = $10, \
             updated_at = $11 WHERE id = $1",
            &[
                &t.id,
                &kind,
                &t.amount,
                &t.date,
                &t.student_id,
                &t.student_name,
                &t.receipt,
                &t.motive,
                &t.category,
                &t.description,
                &t.updated_at,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!("transaction {}", t.id)));
        }
        Ok(())
    }

    fn delete_transaction(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.execute("DELETE FROM transactions WHERE id = $1", &[&id])? > 0)
    }

    fn list_transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>> {
        let mut query = Query::select();
        query
            .columns(TRANSACTION_COLUMNS)
            .from("transactions")
            .cond_where(filter_condition(filter))
            .order_by("date", Order::Desc)
            .order_by("reference", Order::Desc);
        self.fetch_built(&query, transaction_from_row)
    }

    fn inflow_receipt_taken(&self, receipt: &str, except: Option<Uuid>) -> StoreResult<bool> {
        let row = self.executor.query_one(
            "SELECT EXISTS (SELECT 1 FROM transactions WHERE kind = 'entree' AND receipt = $1 \
             AND ($2::uuid IS NULL OR id <> $2)) AS taken",
            &[&receipt, &except],
        )?;
        col(&row, "taken")
    }

    fn totals(&self, filter: &TransactionFilter) -> StoreResult<LedgerTotals> {
        let mut query = Query::select();
        query
            .expr(Expr::cust(
                "COALESCE(SUM(amount) FILTER (WHERE kind = 'entree'), 0)",
            ))
            .expr(Expr::cust(
                "COALESCE(SUM(amount) FILTER (WHERE kind = 'sortie'), 0)",
            ))
            .from("transactions")
            .cond_where(filter_condition(filter));
        let mut totals = self.fetch_built(&query, |row| {
            Ok(LedgerTotals {
                inflows: row
                    .try_get(0)
                    .map_err(|e| StoreError::Parse(format!("inflow total: {e}")))?,
                outflows: row
                    .try_get(1)
                    .map_err(|e| StoreError::Parse(format!("outflow total: {e}")))?,
            })
        })?;
        Ok(totals.pop().unwrap_or_default())
    }
}

impl CertificateStore for PgStore {
    fn insert_certificate(&self, c: &Certificate) -> StoreResult<()> {
        self.execute(
            "INSERT INTO certificates (id, code, student_id, student_name, class_name, matricule, \
             first_enrollment_date, delivery_date, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &c.id,
                &c.code,
                &c.student_id,
                &c.student_name,
                &c.class_name,
                &c.matricule,
                &c.first_enrollment_date,
                &c.delivery_date,
                &c.created_at,
            ],
        )?;
        Ok(())
    }

    fn certificate_code_taken(&self, code: &str) -> StoreResult<bool> {
        let row = self.executor.query_one(
            "SELECT EXISTS (SELECT 1 FROM certificates WHERE code = $1) AS taken",
            &[&code],
        )?;
        col(&row, "taken")
    }

    fn recent_certificates(&self, limit: usize) -> StoreResult<Vec<Certificate>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!("{SELECT_CERTIFICATE} ORDER BY created_at DESC LIMIT $1");
        self.fetch(&sql, &[&limit], certificate_from_row)
    }
}

impl UserStore for PgStore {
    fn insert_user(&self, u: &User) -> StoreResult<()> {
        let role = u.role.as_str();
        self.execute(
            "INSERT INTO users (id, username, password_hash, display_name, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &u.id,
                &u.username,
                &u.password_hash,
                &u.display_name,
                &role,
                &u.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("{SELECT_USER} WHERE id = $1");
        self.fetch_opt(&sql, &[&id], user_from_row)
    }

    fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("{SELECT_USER} WHERE username = $1");
        self.fetch_opt(&sql, &[&username], user_from_row)
    }

    fn insert_agent(&self, a: &Agent) -> StoreResult<()> {
        self.execute(
            "INSERT INTO agents (id, user_id, last_name, first_name, function, active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &a.id,
                &a.user_id,
                &a.last_name,
                &a.first_name,
                &a.function,
                &a.active,
                &a.created_at,
            ],
        )?;
        Ok(())
    }

    fn agents_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Agent>> {
        let sql = format!("{SELECT_AGENT} WHERE user_id = $1 ORDER BY created_at");
        self.fetch(&sql, &[&user_id], agent_from_row)
    }

    fn get_agent(&self, id: Uuid) -> StoreResult<Option<Agent>> {
        let sql = format!("{SELECT_AGENT} WHERE id = $1");
        self.fetch_opt(&sql, &[&id], agent_from_row)
    }

    fn deactivate_agent(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.execute("UPDATE agents SET active = FALSE WHERE id = $1", &[&id])? > 0)
    }
}

impl Store for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
