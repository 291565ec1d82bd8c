use crate::client::local_db::friends;
use crate::client::state::Projection;
use crate::shared::event::FriendEvent;
use crate::shared::messaging::{Friend, FriendNotification};

use super::{MergeOutcome, PushMerger};

impl PushMerger {
    pub(super) async fn merge_friend_request(
        &self,
        projection: &mut Projection,
        event: FriendEvent,
    ) -> MergeOutcome {
        let notification = FriendNotification::request(event.fromemail, event.timestamp);
        projection.add_notification(notification.clone());

        let result = self
            .store
            .mutate("merge_friend_request", move |conn| {
                Box::pin(async move { friends::add_notification(conn, &notification).await })
            })
            .await;
        MergeOutcome::from_store(result, |added| added)
    }

    /// Confirm a friendship and clear the sender's pending notifications
    pub(super) async fn merge_friend_accept(
        &self,
        projection: &mut Projection,
        event: FriendEvent,
    ) -> MergeOutcome {
        let friend = Friend::new(event.fromemail, event.nickname);
        projection.upsert_friend(friend.clone());
        projection.remove_notifications_from(&friend.email);

        let result = self
            .store
            .mutate("merge_friend_accept", move |conn| {
                Box::pin(async move {
                    let upserted = friends::upsert(conn, &friend).await?;
                    let cleared = friends::remove_notifications_from(conn, &friend.email).await?;
                    Ok(upserted || cleared > 0)
                })
            })
            .await;
        MergeOutcome::from_store(result, |changed| changed)
    }

    pub(super) async fn merge_friend_remove(
        &self,
        projection: &mut Projection,
        event: FriendEvent,
    ) -> MergeOutcome {
        projection.remove_friend(&event.fromemail);
        projection.remove_notifications_from(&event.fromemail);

        let email = event.fromemail;
        let result = self
            .store
            .mutate("merge_friend_remove", move |conn| {
                Box::pin(async move {
                    let removed = friends::delete(conn, &email).await?;
                    let cleared = friends::remove_notifications_from(conn, &email).await?;
                    Ok(removed || cleared > 0)
                })
            })
            .await;
        MergeOutcome::from_store(result, |changed| changed)
    }
}
