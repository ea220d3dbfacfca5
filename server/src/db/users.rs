use crate::db::models::{Role, User};
use crate::db::{new_id, DbPool};
use chrono::Utc;
use sqlx::Row;

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub nom: &'a str,
    pub prenom: &'a str,
    pub telephone: Option<&'a str>,
    pub entreprise: Option<&'a str>,
    pub role: Role,
}

pub async fn create_user(pool: &DbPool, new: NewUser<'_>) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password_hash, nom, prenom, telephone, entreprise, role, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(new_id())
    .bind(new.email.trim().to_lowercase())
    .bind(new.password_hash)
    .bind(new.nom)
    .bind(new.prenom)
    .bind(new.telephone)
    .bind(new.entreprise)
    .bind(new.role)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn get_user_by_id(pool: &DbPool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_user_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await
}

pub async fn list_users(
    pool: &DbPool,
    role: Option<Role>,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<User>, sqlx::Error> {
    let pattern = search.map(|q| format!("%{}%", q.to_lowercase()));
    sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE ($1 IS NULL OR role = $1)
          AND ($2 IS NULL OR lower(email) LIKE $2 OR lower(nom) LIKE $2 OR lower(prenom) LIKE $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(role)
    .bind(pattern)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_users_filtered(
    pool: &DbPool,
    role: Option<Role>,
    search: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let pattern = search.map(|q| format!("%{}%", q.to_lowercase()));
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) as count FROM users
        WHERE ($1 IS NULL OR role = $1)
          AND ($2 IS NULL OR lower(email) LIKE $2 OR lower(nom) LIKE $2 OR lower(prenom) LIKE $2)
        "#,
    )
    .bind(role)
    .bind(pattern)
    .fetch_one(pool)
    .await?;
    Ok(row.get("count"))
}

pub async fn update_last_login(pool: &DbPool, user_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_users(pool: &DbPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

pub async fn count_by_role(pool: &DbPool, role: Role) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users WHERE role = $1")
        .bind(role)
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

pub async fn list_admin_ids(pool: &DbPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM users WHERE role = 'admin' AND is_active = 1")
        .fetch_all(pool)
        .await
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub telephone: Option<String>,
    pub entreprise: Option<String>,
}

pub async fn update_user_profile(
    pool: &DbPool,
    user_id: &str,
    update: ProfileUpdate,
) -> Result<User, sqlx::Error> {
    let user = get_user_by_id(pool, user_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

    sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET nom = $1, prenom = $2, telephone = $3, entreprise = $4
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(update.nom.unwrap_or(user.nom))
    .bind(update.prenom.unwrap_or(user.prenom))
    .bind(update.telephone.or(user.telephone))
    .bind(update.entreprise.or(user.entreprise))
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn set_password_hash(
    pool: &DbPool,
    user_id: &str,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(password_hash)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_avatar(pool: &DbPool, user_id: &str, path: &str) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>("UPDATE users SET avatar = $1 WHERE id = $2 RETURNING *")
        .bind(path)
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn set_active(pool: &DbPool, user_id: &str, is_active: bool) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>("UPDATE users SET is_active = $1 WHERE id = $2 RETURNING *")
        .bind(is_active)
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn delete_user(pool: &DbPool, user_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Recalcule la note moyenne à partir de tous les avis reçus.
pub async fn recompute_rating(pool: &DbPool, user_id: &str) -> Result<(f64, i64), sqlx::Error> {
    let row = sqlx::query(
        "SELECT COALESCE(AVG(note), 0.0) as moyenne, COUNT(*) as total FROM avis WHERE destinataire_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let moyenne: f64 = row.get("moyenne");
    let total: i64 = row.get("total");
    let moyenne = (moyenne * 10.0).round() / 10.0;

    sqlx::query("UPDATE users SET note_moyenne = $1, nombre_avis = $2 WHERE id = $3")
        .bind(moyenne)
        .bind(total)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok((moyenne, total))
}
