// ==========================================
// 橱柜工坊偏差引擎 - 项目数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 项目/成本行/板件/板材规格/物料需求的数据访问
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::project::{CostLine, MaterialRequirement, PanelPart, Project, SheetFormat};
use crate::domain::types::CostKind;
use crate::repository::error::{parse_column, RepositoryError, RepositoryResult};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// ProjectRepository Trait
// ==========================================
// 实现者: ProjectRepositoryImpl（使用 rusqlite）
pub trait ProjectRepository: Send + Sync {
    /// 查询项目，不存在返回 None
    fn find_project(&self, project_id: &str) -> RepositoryResult<Option<Project>>;

    /// 查询全部项目
    fn list_projects(&self) -> RepositoryResult<Vec<Project>>;

    /// 查询项目成本行
    fn list_cost_lines(&self, project_id: &str) -> RepositoryResult<Vec<CostLine>>;

    /// 查询项目板件
    fn list_panel_parts(&self, project_id: &str) -> RepositoryResult<Vec<PanelPart>>;

    /// 查询项目板材规格（未配置返回 None）
    fn find_sheet_format(&self, project_id: &str) -> RepositoryResult<Option<SheetFormat>>;

    /// 查询项目物料需求
    fn list_material_requirements(
        &self,
        project_id: &str,
    ) -> RepositoryResult<Vec<MaterialRequirement>>;

    /// 写入物料需求 (按 project_id + material_code upsert)
    fn upsert_material_requirement(&self, requirement: &MaterialRequirement)
        -> RepositoryResult<()>;

    /// 删除不在保留集合内的物料需求
    ///
    /// # 返回
    /// - 删除的行数
    fn delete_material_requirements_except(
        &self,
        project_id: &str,
        keep_codes: &[String],
    ) -> RepositoryResult<usize>;

    /// 查询引用了任一物料编码的项目ID（按物料需求）
    fn find_project_ids_by_material_codes(
        &self,
        material_codes: &[String],
    ) -> RepositoryResult<Vec<String>>;
}

// ==========================================
// ProjectRepositoryImpl
// ==========================================
pub struct ProjectRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ProjectRepositoryImpl {
    /// 创建新的 ProjectRepositoryImpl 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入接口（供上游 CRUD 与测试数据准备使用）
    // ==========================================

    /// 新增或更新项目
    pub fn save_project(&self, project: &Project) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO project (project_id, project_type, markup) VALUES (?1, ?2, ?3)
            ON CONFLICT(project_id) DO UPDATE SET project_type = ?2, markup = ?3
            "#,
            params![project.id, project.project_type, project.markup],
        )?;
        Ok(())
    }

    /// 新增成本行
    pub fn insert_cost_line(&self, line: &CostLine) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO cost_line (cost_line_id, project_id, kind, amount) VALUES (?1, ?2, ?3, ?4)",
            params![line.id, line.project_id, line.kind.as_str(), line.amount],
        )?;
        Ok(())
    }

    /// 用新板件列表整体替换项目板件
    pub fn replace_panel_parts(&self, project_id: &str, parts: &[PanelPart]) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM panel_part WHERE project_id = ?1", params![project_id])?;
        for (idx, part) in parts.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO panel_part (part_id, project_id, length, width, qty, material_code)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    format!("{}-{}", project_id, idx + 1),
                    project_id,
                    part.length,
                    part.width,
                    part.qty,
                    part.material_code,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// 设置项目板材规格，None 表示清除
    pub fn set_sheet_format(
        &self,
        project_id: &str,
        sheet: Option<SheetFormat>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        match sheet {
            Some(s) => {
                conn.execute(
                    r#"
                    INSERT INTO project_sheet_format (project_id, length, width) VALUES (?1, ?2, ?3)
                    ON CONFLICT(project_id) DO UPDATE SET length = ?2, width = ?3
                    "#,
                    params![project_id, s.length, s.width],
                )?;
            }
            None => {
                conn.execute(
                    "DELETE FROM project_sheet_format WHERE project_id = ?1",
                    params![project_id],
                )?;
            }
        }
        Ok(())
    }

    fn map_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
        Ok(Project {
            id: row.get(0)?,
            project_type: row.get(1)?,
            markup: row.get(2)?,
        })
    }
}

impl ProjectRepository for ProjectRepositoryImpl {
    fn find_project(&self, project_id: &str) -> RepositoryResult<Option<Project>> {
        let conn = self.get_conn()?;
        let project = conn
            .query_row(
                "SELECT project_id, project_type, markup FROM project WHERE project_id = ?1",
                params![project_id],
                Self::map_project,
            )
            .optional()?;
        Ok(project)
    }

    fn list_projects(&self) -> RepositoryResult<Vec<Project>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT project_id, project_type, markup FROM project ORDER BY project_id ASC",
        )?;
        let projects = stmt
            .query_map([], Self::map_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    fn list_cost_lines(&self, project_id: &str) -> RepositoryResult<Vec<CostLine>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT cost_line_id, project_id, kind, amount
            FROM cost_line
            WHERE project_id = ?1
            ORDER BY cost_line_id ASC
            "#,
        )?;
        let raw = stmt
            .query_map(params![project_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(id, project_id, kind, amount)| {
                Ok(CostLine {
                    id,
                    project_id,
                    kind: parse_column("cost_line.kind", &kind, CostKind::parse)?,
                    amount,
                })
            })
            .collect()
    }

    fn list_panel_parts(&self, project_id: &str) -> RepositoryResult<Vec<PanelPart>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT length, width, qty, material_code
            FROM panel_part
            WHERE project_id = ?1
            ORDER BY part_id ASC
            "#,
        )?;
        let parts = stmt
            .query_map(params![project_id], |row| {
                Ok(PanelPart {
                    length: row.get(0)?,
                    width: row.get(1)?,
                    qty: row.get(2)?,
                    material_code: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(parts)
    }

    fn find_sheet_format(&self, project_id: &str) -> RepositoryResult<Option<SheetFormat>> {
        let conn = self.get_conn()?;
        let sheet = conn
            .query_row(
                "SELECT length, width FROM project_sheet_format WHERE project_id = ?1",
                params![project_id],
                |row| {
                    Ok(SheetFormat {
                        length: row.get(0)?,
                        width: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(sheet)
    }

    fn list_material_requirements(
        &self,
        project_id: &str,
    ) -> RepositoryResult<Vec<MaterialRequirement>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT project_id, material_code, required_qty, allocated_qty
            FROM material_requirement
            WHERE project_id = ?1
            ORDER BY material_code ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(MaterialRequirement {
                    project_id: row.get(0)?,
                    material_code: row.get(1)?,
                    required_qty: row.get(2)?,
                    allocated_qty: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn upsert_material_requirement(
        &self,
        requirement: &MaterialRequirement,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO material_requirement (project_id, material_code, required_qty, allocated_qty, updated_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now'))
            ON CONFLICT(project_id, material_code) DO UPDATE SET
                required_qty = ?3,
                allocated_qty = ?4,
                updated_at = datetime('now')
            "#,
            params![
                requirement.project_id,
                requirement.material_code,
                requirement.required_qty,
                requirement.allocated_qty,
            ],
        )?;
        Ok(())
    }

    fn delete_material_requirements_except(
        &self,
        project_id: &str,
        keep_codes: &[String],
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        if keep_codes.is_empty() {
            let n = conn.execute(
                "DELETE FROM material_requirement WHERE project_id = ?1",
                params![project_id],
            )?;
            return Ok(n);
        }

        let placeholders = (0..keep_codes.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM material_requirement WHERE project_id = ?1 AND material_code NOT IN ({})",
            placeholders
        );

        let mut values: Vec<&str> = Vec::with_capacity(keep_codes.len() + 1);
        values.push(project_id);
        values.extend(keep_codes.iter().map(String::as_str));

        let n = conn.execute(&sql, params_from_iter(values))?;
        Ok(n)
    }

    fn find_project_ids_by_material_codes(
        &self,
        material_codes: &[String],
    ) -> RepositoryResult<Vec<String>> {
        if material_codes.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let placeholders = (0..material_codes.len())
            .map(|i| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT project_id FROM material_requirement WHERE material_code IN ({}) ORDER BY project_id ASC",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(material_codes.iter()), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}
