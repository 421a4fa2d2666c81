table! {
    files (id) {
        id -> Int8,
        user_id -> Int8,
        filename -> Varchar,
        size -> Int8,
        blob_id -> Varchar,
        date_created -> Timestamp,
    }
}

table! {
    users (id) {
        id -> Int8,
        username -> Varchar,
        password_hash -> Varchar,
        usage -> Int8,
        date_registered -> Timestamp,
    }
}

joinable!(files -> users (user_id));

allow_tables_to_appear_in_same_query!(files, users,);
