// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::{BTreeSet, HashMap};

use gatekeeper_types::{GroupName, UserId, UserPermission};

use crate::merged_with_unrestricted;

#[derive(Debug, Default)]
pub(super) struct MemoryPermissionState {
    users: HashMap<UserId, UserPermission>,
}

impl MemoryPermissionState {
    pub(super) fn put(&mut self, permission: UserPermission) {
        let _ = self.users.insert(permission.id.clone(), permission);
    }

    /// Replace the whole population; the unrestricted record survives even
    /// when absent from the input.
    pub(super) fn replace_all(&mut self, permissions: HashMap<UserId, UserPermission>) {
        self.users
            .retain(|id, _| id.is_unrestricted() || permissions.contains_key(id));
        self.users.extend(permissions);
    }

    pub(super) fn remove(&mut self, id: &UserId) {
        let _ = self.users.remove(id);
    }

    fn unrestricted(&self) -> Option<&UserPermission> {
        self.users.get(&UserId::unrestricted())
    }

    pub(super) fn get_merged(&self, id: &UserId) -> Option<UserPermission> {
        let stored = self.users.get(id)?.clone();
        Some(merged_with_unrestricted(stored, self.unrestricted()))
    }

    pub(super) fn get_all_merged(&self) -> HashMap<UserId, UserPermission> {
        let unrestricted = self.unrestricted();
        self.users
            .values()
            .map(|permission| {
                (
                    permission.id.clone(),
                    merged_with_unrestricted(permission.clone(), unrestricted),
                )
            })
            .collect()
    }

    pub(super) fn get_by_roles_merged(
        &self,
        roles: Option<&[GroupName]>,
    ) -> HashMap<UserId, UserPermission> {
        let Some(roles) = roles else {
            return self.get_all_merged();
        };

        let wanted: BTreeSet<&GroupName> = roles.iter().collect();
        let unrestricted = self.unrestricted();

        self.users
            .values()
            .filter(|permission| {
                permission.id.is_unrestricted()
                    || permission
                        .roles_held()
                        .iter()
                        .any(|group| wanted.contains(group))
            })
            .map(|permission| {
                (
                    permission.id.clone(),
                    merged_with_unrestricted(permission.clone(), unrestricted),
                )
            })
            .collect()
    }
}
