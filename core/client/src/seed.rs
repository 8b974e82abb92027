//! Placeholder issues shown when neither the backend nor the cache has data.

use chrono::{DateTime, TimeZone, Utc};

use civicsync_common::{Issue, IssueId, IssueStatus};

struct SeedRow {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    category: &'static str,
    status: IssueStatus,
    location: &'static str,
    upvotes: u32,
    created_at: (i32, u32, u32, u32, u32),
    updated_at: (i32, u32, u32, u32, u32),
    user_id: &'static str,
    user_name: &'static str,
}

const SEED: [SeedRow; 2] = [
    SeedRow {
        id: "1",
        title: "Pothole on Main Street",
        description: "Large pothole causing traffic issues",
        category: "Road",
        status: IssueStatus::Pending,
        location: "Main Street, Downtown",
        upvotes: 15,
        created_at: (2024, 1, 15, 10, 30),
        updated_at: (2024, 1, 15, 10, 30),
        user_id: "user1",
        user_name: "John Doe",
    },
    SeedRow {
        id: "2",
        title: "Water Leak in Park Avenue",
        description: "Continuous water leak from underground pipe",
        category: "Water",
        status: IssueStatus::InProgress,
        location: "Park Avenue, Block 5",
        upvotes: 8,
        created_at: (2024, 1, 14, 14, 20),
        updated_at: (2024, 1, 16, 9, 15),
        user_id: "user2",
        user_name: "Jane Smith",
    },
];

fn timestamp((year, month, day, hour, min): (i32, u32, u32, u32, u32)) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, 0).single()
}

impl SeedRow {
    fn to_issue(&self) -> Option<Issue> {
        Some(Issue {
            id: IssueId::new(self.id).ok()?,
            title: self.title.to_string(),
            description: self.description.to_string(),
            category: self.category.to_string(),
            status: self.status,
            location: Some(self.location.to_string()),
            latitude: None,
            longitude: None,
            image_url: None,
            upvotes: self.upvotes,
            created_at: timestamp(self.created_at),
            updated_at: timestamp(self.updated_at),
            user_id: Some(self.user_id.to_string()),
            user_name: Some(self.user_name.to_string()),
        })
    }
}

/// Fixed, non-empty issue collection.
pub fn seed_issues() -> Vec<Issue> {
    SEED.iter().filter_map(SeedRow::to_issue).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_not_empty() {
        let issues = seed_issues();
        assert_eq!(issues.len(), SEED.len());
        assert_eq!(issues[0].title, "Pothole on Main Street");
        assert_eq!(issues[1].status, IssueStatus::InProgress);
        assert!(issues.iter().all(|i| i.created_at.is_some()));
    }
}
