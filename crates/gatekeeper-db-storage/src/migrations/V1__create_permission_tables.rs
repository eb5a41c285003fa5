// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use barrel::{backend::Pg, types, Migration};

pub fn migration() -> String {
    let mut m = Migration::new();

    m.create_table("users", |table| {
        table.add_column("id", types::varchar(255).primary(true));
        table.add_column("admin", types::boolean().default(false));
        table.add_column("updated_at", types::custom("BIGINT"));
    });

    m.create_table("resources", |table| {
        table.add_column("resource_type", types::varchar(255));
        table.add_column("resource_name", types::varchar(255));
        table.add_column("body", types::text());
        table.add_column("body_hash", types::varchar(64).nullable(true));
        table.add_column("updated_at", types::custom("BIGINT").nullable(true));

        table.inject_custom("PRIMARY KEY (resource_type, resource_name)");
    });

    m.create_table("permissions", |table| {
        table.add_column("user_id", types::varchar(255));
        table.add_column("resource_type", types::varchar(255));
        table.add_column("resource_name", types::varchar(255));

        table.inject_custom("PRIMARY KEY (user_id, resource_type, resource_name)");
        table.inject_custom("FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE");
        table.inject_custom(
            "FOREIGN KEY (resource_type, resource_name) \
             REFERENCES resources (resource_type, resource_name) ON DELETE CASCADE",
        );
    });

    m.make::<Pg>()
}
