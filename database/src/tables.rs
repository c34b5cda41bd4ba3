//! Diesel schema of the service
//!
//! The five persisted shapes (user, project, file node, file content and the
//! rating/friendship edges) are flat tables referencing each other by id.

diesel::table! {
    auth_user (id) {
        id -> BigInt,
        username -> Text,
        email -> Text,
        password_hash -> Text,
        display_name -> Nullable<Text>,
        role -> Text,
        avatar_id -> Nullable<BigInt>,
        creation_date -> Timestamptz,
        last_login -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    document (id) {
        id -> BigInt,
        content_type -> Text,
        data -> Binary,
    }
}

diesel::table! {
    project (id) {
        id -> BigInt,
        owner_id -> BigInt,
        name -> Text,
        description -> Nullable<Text>,
        public -> Bool,
        tags -> Array<Nullable<Text>>,
        image_id -> Nullable<BigInt>,
        forked_from -> Nullable<BigInt>,
        view_count -> BigInt,
        creation_date -> Timestamptz,
        last_modification -> Timestamptz,
    }
}

diesel::table! {
    file_node (id) {
        id -> BigInt,
        project_id -> BigInt,
        path -> Text,
        kind -> Text,
        document_id -> Nullable<BigInt>,
        creation_date -> Timestamptz,
        last_modification -> Timestamptz,
    }
}

diesel::table! {
    project_collaborator (id) {
        id -> BigInt,
        project_id -> BigInt,
        user_id -> BigInt,
        role -> Text,
        creation_date -> Timestamptz,
    }
}

diesel::table! {
    friendship (id) {
        id -> BigInt,
        requester_id -> BigInt,
        addressee_id -> BigInt,
        status -> Text,
        creation_date -> Timestamptz,
    }
}

diesel::table! {
    project_rating (id) {
        id -> BigInt,
        project_id -> BigInt,
        user_id -> BigInt,
        score -> Integer,
        comment -> Nullable<Text>,
        creation_date -> Timestamptz,
    }
}

diesel::joinable!(project -> auth_user (owner_id));
diesel::joinable!(project -> document (image_id));
diesel::joinable!(file_node -> project (project_id));
diesel::joinable!(file_node -> document (document_id));
diesel::joinable!(project_collaborator -> project (project_id));
diesel::joinable!(project_collaborator -> auth_user (user_id));
diesel::joinable!(project_rating -> project (project_id));
diesel::joinable!(project_rating -> auth_user (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    auth_user,
    document,
    project,
    file_node,
    project_collaborator,
    friendship,
    project_rating,
);
