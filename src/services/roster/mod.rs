//! Teacher and class directory.
//!
//! Both are soft-deleted: leave history references them by id, so rows are
//! only ever flagged inactive.

use std::sync::Arc;
use std::time::Duration;

use sea_query::{Cond, Expr, Iden, Order, Query};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::WorkflowConfig;
use crate::interfaces::activity_sink::{ActivityEntry, ActivitySink};
use crate::interfaces::storage_adapter::{Executor, StorageAdapter, StorageError};
use crate::services::activity::TracingActivitySink;
use crate::services::build_query;
use crate::services::error::{Result, WorkflowError};
use crate::services::leave_workflow::Actor;
use crate::storage::schema::{Classes, Teachers};
use crate::storage::{with_deadline, ExecResult, Row, Value};

/// A teacher as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Teacher {
    pub id: i64,
    pub name: String,
    pub subject: String,
    pub nip: Option<String>,
    pub nuptk: Option<String>,
    pub is_active: bool,
}

impl Teacher {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            name: row.get_str("nama")?,
            subject: row.get_str("mapel")?,
            nip: row.get_opt_str("nip")?,
            nuptk: row.get_opt_str("nuptk")?,
            is_active: row.get_bool("is_active")?,
        })
    }
}

/// Teacher fields supplied on create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTeacher {
    pub name: String,
    pub subject: String,
    pub nip: Option<String>,
    pub nuptk: Option<String>,
}

impl NewTeacher {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.subject.trim().is_empty() {
            return Err(WorkflowError::validation("teacher name and subject are required"));
        }
        Ok(())
    }
}

/// A class as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassRoom {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub is_active: bool,
}

impl ClassRoom {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            code: row.get_str("kode")?,
            name: row.get_str("nama")?,
            is_active: row.get_bool("is_active")?,
        })
    }
}

/// Class fields supplied on create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClass {
    pub code: String,
    pub name: String,
}

impl NewClass {
    fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() || self.name.trim().is_empty() {
            return Err(WorkflowError::validation("class code and name are required"));
        }
        Ok(())
    }
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Teacher and class directory over a storage adapter.
pub struct Roster {
    storage: Arc<dyn StorageAdapter>,
    activity: Arc<dyn ActivitySink>,
    deadline: Option<Duration>,
}

impl Roster {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            activity: Arc::new(TracingActivitySink),
            deadline: None,
        }
    }

    pub fn with_config(mut self, config: &WorkflowConfig) -> Self {
        self.deadline = config.deadline();
        self
    }

    pub fn with_activity_sink(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = activity;
        self
    }

    fn record(
        &self,
        action: &'static str,
        entity_type: &'static str,
        entity_id: Option<i64>,
        actor: &Actor,
        description: String,
    ) {
        self.activity.record(ActivityEntry {
            action,
            entity_type,
            entity_id,
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            description,
        });
    }

    // Teachers

    /// Active teachers ordered by name.
    pub async fn list_teachers(&self) -> Result<Vec<Teacher>> {
        let (sql, params) = build_query(
            Query::select()
                .columns([
                    Teachers::Id,
                    Teachers::Nama,
                    Teachers::Mapel,
                    Teachers::Nip,
                    Teachers::Nuptk,
                    Teachers::IsActive,
                ])
                .from(Teachers::Table)
                .and_where(Expr::col(Teachers::IsActive).eq(true))
                .order_by(Teachers::Nama, Order::Asc)
                .to_owned(),
        );
        let rows = self.storage.query(&sql, &params).await?;
        rows.iter().map(Teacher::from_row).collect()
    }

    pub async fn create_teacher(&self, teacher: NewTeacher, actor: &Actor) -> Result<i64> {
        teacher.validate()?;
        let (sql, params) = teacher_insert(&teacher);
        let id = inserted_id(self.storage.execute(&sql, &params).await?)?;
        info!(teacher_id = id, "Teacher created");
        self.record(
            "CREATE_TEACHER",
            "teacher",
            Some(id),
            actor,
            format!("Created teacher: {}", teacher.name.trim()),
        );
        Ok(id)
    }

    pub async fn update_teacher(&self, id: i64, teacher: NewTeacher, actor: &Actor) -> Result<()> {
        teacher.validate()?;
        self.ensure_exists(Teachers::Table, Teachers::Id, "teacher", id)
            .await?;
        let (sql, params) = build_query(
            Query::update()
                .table(Teachers::Table)
                .values([
                    (Teachers::Nama, teacher.name.trim().into()),
                    (Teachers::Mapel, teacher.subject.trim().into()),
                    (Teachers::Nip, optional(&teacher.nip).into()),
                    (Teachers::Nuptk, optional(&teacher.nuptk).into()),
                ])
                .and_where(Expr::col(Teachers::Id).eq(id))
                .to_owned(),
        );
        self.storage.execute(&sql, &params).await?;
        info!(teacher_id = id, "Teacher updated");
        self.record(
            "UPDATE_TEACHER",
            "teacher",
            Some(id),
            actor,
            format!("Updated teacher: {}", teacher.name.trim()),
        );
        Ok(())
    }

    /// Soft delete.
    pub async fn deactivate_teacher(&self, id: i64, actor: &Actor) -> Result<()> {
        self.ensure_exists(Teachers::Table, Teachers::Id, "teacher", id)
            .await?;
        self.deactivate(Teachers::Table, Teachers::Id, Teachers::IsActive, &[id])
            .await?;
        info!(teacher_id = id, "Teacher deactivated");
        self.record(
            "DELETE_TEACHER",
            "teacher",
            Some(id),
            actor,
            format!("Soft deleted teacher ID: {}", id),
        );
        Ok(())
    }

    /// Create many teachers in one transaction. Returns the new ids in input order.
    pub async fn create_teachers(&self, teachers: Vec<NewTeacher>, actor: &Actor) -> Result<Vec<i64>> {
        if teachers.is_empty() {
            return Err(WorkflowError::validation("no teachers given"));
        }
        for teacher in &teachers {
            teacher.validate()?;
        }
        let count = teachers.len();
        let statements: Vec<_> = teachers.iter().map(teacher_insert).collect();
        let ids = with_deadline(
            self.deadline,
            self.storage
                .transaction(move |tx| Box::pin(async move { insert_all(tx, &statements).await })),
        )
        .await?;
        info!(count, "Teachers created");
        self.record(
            "BULK_CREATE_TEACHERS",
            "teacher",
            None,
            actor,
            format!("Created {} teachers", count),
        );
        Ok(ids)
    }

    /// Soft delete many. Returns the number of rows changed.
    pub async fn deactivate_teachers(&self, ids: &[i64], actor: &Actor) -> Result<u64> {
        if ids.is_empty() {
            return Err(WorkflowError::validation("no teacher ids given"));
        }
        let affected = self
            .deactivate(Teachers::Table, Teachers::Id, Teachers::IsActive, ids)
            .await?;
        info!(requested = ids.len(), affected, "Teachers deactivated");
        self.record(
            "BULK_DELETE_TEACHERS",
            "teacher",
            None,
            actor,
            format!("Deleted {} teachers", ids.len()),
        );
        Ok(affected)
    }

    // Classes

    /// Active classes ordered by name.
    pub async fn list_classes(&self) -> Result<Vec<ClassRoom>> {
        let (sql, params) = build_query(
            Query::select()
                .columns([Classes::Id, Classes::Kode, Classes::Nama, Classes::IsActive])
                .from(Classes::Table)
                .and_where(Expr::col(Classes::IsActive).eq(true))
                .order_by(Classes::Nama, Order::Asc)
                .to_owned(),
        );
        let rows = self.storage.query(&sql, &params).await?;
        rows.iter().map(ClassRoom::from_row).collect()
    }

    /// Create a class. Code and name must be unique among active classes.
    pub async fn create_class(&self, class: NewClass, actor: &Actor) -> Result<i64> {
        class.validate()?;
        self.ensure_class_unique(&class, None).await?;
        let (sql, params) = class_insert(&class);
        let id = inserted_id(self.storage.execute(&sql, &params).await?)?;
        info!(class_id = id, code = %class.code.trim(), "Class created");
        self.record(
            "CREATE_CLASS",
            "class",
            Some(id),
            actor,
            format!("Created class: {}", class.name.trim()),
        );
        Ok(id)
    }

    pub async fn update_class(&self, id: i64, class: NewClass, actor: &Actor) -> Result<()> {
        class.validate()?;
        self.ensure_exists(Classes::Table, Classes::Id, "class", id)
            .await?;
        self.ensure_class_unique(&class, Some(id)).await?;
        let (sql, params) = build_query(
            Query::update()
                .table(Classes::Table)
                .values([
                    (Classes::Kode, class.code.trim().into()),
                    (Classes::Nama, class.name.trim().into()),
                ])
                .and_where(Expr::col(Classes::Id).eq(id))
                .to_owned(),
        );
        self.storage.execute(&sql, &params).await?;
        info!(class_id = id, "Class updated");
        self.record(
            "UPDATE_CLASS",
            "class",
            Some(id),
            actor,
            format!("Updated class: {}", class.name.trim()),
        );
        Ok(())
    }

    /// Soft delete.
    pub async fn deactivate_class(&self, id: i64, actor: &Actor) -> Result<()> {
        self.ensure_exists(Classes::Table, Classes::Id, "class", id)
            .await?;
        self.deactivate(Classes::Table, Classes::Id, Classes::IsActive, &[id])
            .await?;
        info!(class_id = id, "Class deactivated");
        self.record(
            "DELETE_CLASS",
            "class",
            Some(id),
            actor,
            format!("Deleted class ID: {}", id),
        );
        Ok(())
    }

    /// Create many classes in one transaction. Returns the new ids in input order.
    pub async fn create_classes(&self, classes: Vec<NewClass>, actor: &Actor) -> Result<Vec<i64>> {
        if classes.is_empty() {
            return Err(WorkflowError::validation("no classes given"));
        }
        for class in &classes {
            class.validate()?;
        }
        let count = classes.len();
        let statements: Vec<_> = classes.iter().map(class_insert).collect();
        let ids = with_deadline(
            self.deadline,
            self.storage
                .transaction(move |tx| Box::pin(async move { insert_all(tx, &statements).await })),
        )
        .await?;
        info!(count, "Classes created");
        self.record(
            "BULK_CREATE_CLASSES",
            "class",
            None,
            actor,
            format!("Created {} classes", count),
        );
        Ok(ids)
    }

    /// Soft delete many. Returns the number of rows changed.
    pub async fn deactivate_classes(&self, ids: &[i64], actor: &Actor) -> Result<u64> {
        if ids.is_empty() {
            return Err(WorkflowError::validation("no class ids given"));
        }
        let affected = self
            .deactivate(Classes::Table, Classes::Id, Classes::IsActive, ids)
            .await?;
        info!(requested = ids.len(), affected, "Classes deactivated");
        self.record(
            "BULK_DELETE_CLASSES",
            "class",
            None,
            actor,
            format!("Deleted {} classes", ids.len()),
        );
        Ok(affected)
    }

    async fn ensure_class_unique(&self, class: &NewClass, except: Option<i64>) -> Result<()> {
        let mut cond = Cond::all()
            .add(
                Cond::any()
                    .add(Expr::col(Classes::Kode).eq(class.code.trim()))
                    .add(Expr::col(Classes::Nama).eq(class.name.trim())),
            )
            .add(Expr::col(Classes::IsActive).eq(true));
        if let Some(id) = except {
            cond = cond.add(Expr::col(Classes::Id).ne(id));
        }
        let (sql, params) = build_query(
            Query::select()
                .column(Classes::Id)
                .from(Classes::Table)
                .cond_where(cond)
                .to_owned(),
        );
        if !self.storage.query(&sql, &params).await?.is_empty() {
            return Err(WorkflowError::Conflict(format!(
                "class code '{}' or name '{}' already exists",
                class.code.trim(),
                class.name.trim()
            )));
        }
        Ok(())
    }

    async fn ensure_exists<I>(&self, table: I, id_col: I, entity: &'static str, id: i64) -> Result<()>
    where
        I: Iden + Copy + 'static,
    {
        let (sql, params) = build_query(
            Query::select()
                .column(id_col)
                .from(table)
                .and_where(Expr::col(id_col).eq(id))
                .to_owned(),
        );
        if self.storage.query(&sql, &params).await?.is_empty() {
            return Err(WorkflowError::NotFound { entity, id });
        }
        Ok(())
    }

    async fn deactivate<I>(&self, table: I, id_col: I, flag_col: I, ids: &[i64]) -> Result<u64>
    where
        I: Iden + Copy + 'static,
    {
        let (sql, params) = build_query(
            Query::update()
                .table(table)
                .value(flag_col, false)
                .and_where(Expr::col(id_col).is_in(ids.iter().copied()))
                .to_owned(),
        );
        let affected = with_deadline(self.deadline, self.storage.execute(&sql, &params))
            .await?
            .affected_rows;
        Ok(affected)
    }
}

fn teacher_insert(teacher: &NewTeacher) -> (String, Vec<Value>) {
    build_query(
        Query::insert()
            .into_table(Teachers::Table)
            .columns([Teachers::Nama, Teachers::Mapel, Teachers::Nip, Teachers::Nuptk])
            .values_panic([
                teacher.name.trim().into(),
                teacher.subject.trim().into(),
                optional(&teacher.nip).into(),
                optional(&teacher.nuptk).into(),
            ])
            .to_owned(),
    )
}

fn class_insert(class: &NewClass) -> (String, Vec<Value>) {
    build_query(
        Query::insert()
            .into_table(Classes::Table)
            .columns([Classes::Kode, Classes::Nama])
            .values_panic([class.code.trim().into(), class.name.trim().into()])
            .to_owned(),
    )
}

/// Run every insert through one executor, returning generated ids in order.
async fn insert_all(exec: &mut dyn Executor, statements: &[(String, Vec<Value>)]) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(statements.len());
    for (sql, params) in statements {
        ids.push(inserted_id(exec.execute(sql, params).await?)?);
    }
    Ok(ids)
}

fn inserted_id(result: ExecResult) -> Result<i64> {
    result.last_insert_id.ok_or_else(|| {
        WorkflowError::Storage(StorageError::Decode {
            column: "id".to_string(),
            reason: "insert did not report a generated identifier".to_string(),
        })
    })
}
