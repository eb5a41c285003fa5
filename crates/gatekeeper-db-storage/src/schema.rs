// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

diesel::table! {
    users (id) {
        #[max_length = 255]
        id -> Varchar,
        admin -> Bool,
        updated_at -> Int8,
    }
}

diesel::table! {
    resources (resource_type, resource_name) {
        #[max_length = 255]
        resource_type -> Varchar,
        #[max_length = 255]
        resource_name -> Varchar,
        body -> Text,
        #[max_length = 64]
        body_hash -> Nullable<Varchar>,
        updated_at -> Nullable<Int8>,
    }
}

diesel::table! {
    permissions (user_id, resource_type, resource_name) {
        #[max_length = 255]
        user_id -> Varchar,
        #[max_length = 255]
        resource_type -> Varchar,
        #[max_length = 255]
        resource_name -> Varchar,
    }
}

diesel::joinable!(permissions -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(users, resources, permissions);
