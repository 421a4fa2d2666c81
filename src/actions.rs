use chrono::offset::Utc;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::result::Error;

use crate::models;

fn generate_timestamp() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub fn get_user_from_username(
    username_to_query: &str,
    conn: &PgConnection,
) -> Result<Option<models::User>, Error> {
    use crate::schema::users::dsl::*;
    match users
        .filter(username.eq(username_to_query))
        .first::<models::User>(conn)
    {
        Ok(user) => Ok(Some(user)),
        Err(Error::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn get_user_from_id(user_id: i64, conn: &PgConnection) -> Result<Option<models::User>, Error> {
    use crate::schema::users::dsl::*;
    users
        .filter(id.eq(user_id))
        .first::<models::User>(conn)
        .optional()
}

pub fn insert_new_user(
    new_username: &str,
    new_password_hash: &str,
    conn: &PgConnection,
) -> Result<models::User, Error> {
    use crate::schema::users::dsl::*;

    let new_user = models::NewUser {
        username: new_username.to_string(),
        password_hash: new_password_hash.to_string(),
        usage: 0,
        date_registered: generate_timestamp(),
    };

    diesel::insert_into(users)
        .values(&new_user)
        .get_result::<models::User>(conn)
}

/// Adds `bytes` to the user's usage in a single statement. With a ceiling the
/// row is only touched when the new total stays within it, so concurrent
/// uploads cannot overshoot. Returns whether the row was updated.
pub fn increment_user_usage(
    user_id: i64,
    bytes: i64,
    ceiling: Option<i64>,
    conn: &PgConnection,
) -> Result<bool, Error> {
    use crate::schema::users::dsl::*;

    let target = users.filter(id.eq(user_id));
    let updated = match ceiling {
        Some(limit) => diesel::update(target.filter((usage + bytes).le(limit)))
            .set(usage.eq(usage + bytes))
            .execute(conn)?,
        None => diesel::update(target)
            .set(usage.eq(usage + bytes))
            .execute(conn)?,
    };

    Ok(updated == 1)
}

pub fn decrement_user_usage(user_id: i64, bytes: i64, conn: &PgConnection) -> Result<(), Error> {
    use crate::schema::users::dsl::*;

    let updated = diesel::update(users.filter(id.eq(user_id).and(usage.ge(bytes))))
        .set(usage.eq(usage - bytes))
        .execute(conn)?;

    if updated == 0 {
        // Never let the counter go negative.
        diesel::update(users.filter(id.eq(user_id)))
            .set(usage.eq(0))
            .execute(conn)?;
    }
    Ok(())
}

pub fn insert_new_file_record(
    new_file: &models::NewFileRecord,
    conn: &PgConnection,
) -> Result<models::FileRecord, Error> {
    use crate::schema::files::dsl::*;

    diesel::insert_into(files)
        .values(new_file)
        .get_result::<models::FileRecord>(conn)
}

pub fn get_file_record_by_owner_and_name(
    owner_id: i64,
    name_to_query: &str,
    conn: &PgConnection,
) -> Result<Option<models::FileRecord>, Error> {
    use crate::schema::files::dsl::*;
    files
        .filter(user_id.eq(owner_id).and(filename.eq(name_to_query)))
        .first::<models::FileRecord>(conn)
        .optional()
}

pub fn get_file_records_for_owner(
    owner_id: i64,
    conn: &PgConnection,
) -> Result<Vec<models::FileRecord>, Error> {
    use crate::schema::files::dsl::*;
    files
        .filter(user_id.eq(owner_id))
        .order(filename)
        .get_results(conn)
}

pub fn delete_file_record(file_id: i64, conn: &PgConnection) -> Result<bool, Error> {
    use crate::schema::files::dsl::*;
    let deleted = diesel::delete(files.filter(id.eq(file_id))).execute(conn)?;
    Ok(deleted == 1)
}
