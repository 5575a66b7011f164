mod common;

use common::{
    assert_silent, connect, drain, mint_token, recv_event, recv_json, recv_reply, send_action,
    start_server, TestBackend,
};
use serde_json::json;
use tokio_tungstenite::tungstenite;

#[tokio::test]
async fn rejects_invalid_token_with_close_frame() {
    let backend = TestBackend::new();
    let addr = start_server(backend.state.clone()).await;

    let mut ws = connect(addr, "not-a-jwt").await;

    use futures_util::StreamExt;
    let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("read error");

    match msg {
        tungstenite::Message::Close(Some(frame)) => {
            assert_eq!(
                frame.code,
                tungstenite::protocol::frame::coding::CloseCode::from(4004)
            );
        }
        tungstenite::Message::Close(None) => {}
        other => panic!("expected close frame, got: {other:?}"),
    }
}

#[tokio::test]
async fn rejects_token_for_unknown_user() {
    let backend = TestBackend::new();
    let addr = start_server(backend.state.clone()).await;

    // Valid signature, but no such user in the store.
    let mut ws = connect(addr, &mint_token("usr_ghost")).await;

    use futures_util::StreamExt;
    let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("read error");
    assert!(matches!(msg, tungstenite::Message::Close(_)));
}

#[tokio::test]
async fn presence_broadcasts_once_per_transition() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    backend.add_user("usr_bob", "bob");
    let addr = start_server(backend.state.clone()).await;

    let mut bob = connect(addr, &mint_token("usr_bob")).await;
    drain(&mut bob).await;

    // First connection: one global userOnline.
    let mut alice1 = connect(addr, &mint_token("usr_alice")).await;
    let event = recv_event(&mut bob, "userOnline").await;
    assert_eq!(event["data"]["userId"], "usr_alice");

    // Second device: no transition, no broadcast.
    let mut alice2 = connect(addr, &mint_token("usr_alice")).await;
    assert_silent(&mut bob).await;

    // Closing one of two connections is not an offline transition.
    use futures_util::SinkExt;
    alice2.close(None).await.expect("close");
    assert_silent(&mut bob).await;

    // Closing the last one is, exactly once.
    alice1.close(None).await.expect("close");
    let event = recv_event(&mut bob, "userOffline").await;
    assert_eq!(event["data"]["userId"], "usr_alice");
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn non_friend_join_room_is_rejected_without_broadcast() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    backend.add_user("usr_bob", "bob");
    let addr = start_server(backend.state.clone()).await;

    let mut alice = connect(addr, &mint_token("usr_alice")).await;
    let mut bob = connect(addr, &mint_token("usr_bob")).await;
    drain(&mut alice).await;
    drain(&mut bob).await;

    send_action(
        &mut alice,
        json!({ "action": "joinRoom", "data": { "receiverId": "usr_bob" } }),
    )
    .await;

    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"]["kind"], "forbidden");
    assert_eq!(reply["error"]["message"], "You can only chat with your friends");

    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn blocked_send_message_is_rejected_without_broadcast() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    backend.add_user("usr_bob", "bob");
    backend.friendships.add_friends("usr_alice", "usr_bob");
    backend.friendships.block("usr_bob", "usr_alice");
    let addr = start_server(backend.state.clone()).await;

    let mut alice = connect(addr, &mint_token("usr_alice")).await;
    let mut bob = connect(addr, &mint_token("usr_bob")).await;
    drain(&mut alice).await;
    drain(&mut bob).await;

    send_action(
        &mut alice,
        json!({ "action": "sendMessage", "data": { "receiverId": "usr_bob", "content": "hi" } }),
    )
    .await;

    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["ok"], false);
    assert_eq!(
        reply["error"]["message"],
        "Messaging is blocked between these users"
    );

    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn direct_message_reaches_receiver_without_join() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    backend.add_user("usr_bob", "bob");
    backend.friendships.add_friends("usr_alice", "usr_bob");
    let addr = start_server(backend.state.clone()).await;

    let mut bob = connect(addr, &mint_token("usr_bob")).await;
    let mut alice1 = connect(addr, &mint_token("usr_alice")).await;
    let mut alice2 = connect(addr, &mint_token("usr_alice")).await;
    drain(&mut bob).await;
    drain(&mut alice1).await;
    drain(&mut alice2).await;

    send_action(
        &mut alice1,
        json!({ "action": "sendMessage", "data": { "receiverId": "usr_bob", "content": "hi bob" } }),
    )
    .await;

    // Bob never joined the room but still gets the message.
    let event = recv_event(&mut bob, "newMessage").await;
    assert_eq!(event["data"]["message"]["content"], "hi bob");
    assert_eq!(event["data"]["message"]["senderId"], "usr_alice");
    assert!(event["data"]["roomId"].as_str().unwrap().starts_with("room_"));

    // The originating connection gets the reply and exactly one echo,
    // in either order.
    let first = recv_json(&mut alice1).await;
    let second = recv_json(&mut alice1).await;
    let (reply, echo) = if first.get("ok").is_some() {
        (first, second)
    } else {
        (second, first)
    };
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["data"]["message"]["content"], "hi bob");
    assert_eq!(echo["event"], "messageSent");
    assert_silent(&mut alice1).await;

    // The sender's other device sees nothing.
    assert_silent(&mut alice2).await;
}

#[tokio::test]
async fn group_message_fans_out_to_members_once() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    backend.add_user("usr_bob", "bob");
    backend.add_user("usr_carol", "carol");
    backend
        .groups
        .insert_group("grp_1", &["usr_alice", "usr_bob", "usr_carol"]);
    let addr = start_server(backend.state.clone()).await;

    let mut alice = connect(addr, &mint_token("usr_alice")).await;
    let mut bob = connect(addr, &mint_token("usr_bob")).await;
    let mut carol = connect(addr, &mint_token("usr_carol")).await;

    for ws in [&mut alice, &mut bob, &mut carol] {
        send_action(ws, json!({ "action": "joinRoom", "data": { "groupId": "grp_1" } })).await;
        let reply = recv_reply(ws).await;
        assert_eq!(reply["ok"], true);
    }
    drain(&mut alice).await;
    drain(&mut bob).await;
    drain(&mut carol).await;

    send_action(
        &mut alice,
        json!({ "action": "sendMessage", "data": { "groupId": "grp_1", "content": "hello group" } }),
    )
    .await;

    for ws in [&mut bob, &mut carol] {
        let event = recv_event(ws, "newMessage").await;
        assert_eq!(event["data"]["message"]["content"], "hello group");
        assert_silent(ws).await;
    }

    // Sender: one reply, one messageSent, no newMessage.
    let first = recv_json(&mut alice).await;
    let second = recv_json(&mut alice).await;
    let (reply, echo) = if first.get("ok").is_some() {
        (first, second)
    } else {
        (second, first)
    };
    assert_eq!(reply["ok"], true);
    assert_eq!(echo["event"], "messageSent");
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn typing_indicator_reaches_direct_counterpart() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    backend.add_user("usr_bob", "bob");
    backend.friendships.add_friends("usr_alice", "usr_bob");
    let addr = start_server(backend.state.clone()).await;

    let mut alice = connect(addr, &mint_token("usr_alice")).await;
    let mut bob = connect(addr, &mint_token("usr_bob")).await;
    drain(&mut alice).await;
    drain(&mut bob).await;

    send_action(
        &mut alice,
        json!({ "action": "typing", "data": { "receiverId": "usr_bob", "isTyping": true } }),
    )
    .await;

    let event = recv_event(&mut bob, "userTyping").await;
    assert_eq!(event["data"]["userId"], "usr_alice");
    assert_eq!(event["data"]["isTyping"], true);
}

#[tokio::test]
async fn mark_as_read_notifies_counterpart() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    backend.add_user("usr_bob", "bob");
    backend.friendships.add_friends("usr_alice", "usr_bob");
    let addr = start_server(backend.state.clone()).await;

    let mut alice = connect(addr, &mint_token("usr_alice")).await;
    let mut bob = connect(addr, &mint_token("usr_bob")).await;
    drain(&mut alice).await;
    drain(&mut bob).await;

    send_action(
        &mut bob,
        json!({ "action": "sendMessage", "data": { "receiverId": "usr_alice", "content": "ping" } }),
    )
    .await;
    recv_reply(&mut bob).await;
    recv_event(&mut alice, "newMessage").await;

    send_action(
        &mut alice,
        json!({ "action": "markAsRead", "data": { "senderId": "usr_bob" } }),
    )
    .await;

    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["data"]["updated"], 1);

    let event = recv_event(&mut bob, "messagesRead").await;
    assert_eq!(event["data"]["readerId"], "usr_alice");
    assert!(event["data"].get("roomId").is_none());
}

#[tokio::test]
async fn online_status_reply_covers_requested_users() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    backend.add_user("usr_bob", "bob");
    let addr = start_server(backend.state.clone()).await;

    let mut alice = connect(addr, &mint_token("usr_alice")).await;
    drain(&mut alice).await;

    send_action(
        &mut alice,
        json!({ "action": "getOnlineStatus", "data": { "userIds": ["usr_alice", "usr_bob"] } }),
    )
    .await;

    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["data"]["onlineStatus"]["usr_alice"], true);
    assert_eq!(reply["data"]["onlineStatus"]["usr_bob"], false);
}

#[tokio::test]
async fn get_messages_paginates_newest_first() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    backend.add_user("usr_bob", "bob");
    backend.friendships.add_friends("usr_alice", "usr_bob");
    let addr = start_server(backend.state.clone()).await;

    let mut alice = connect(addr, &mint_token("usr_alice")).await;
    drain(&mut alice).await;

    for i in 1..=3 {
        send_action(
            &mut alice,
            json!({ "action": "sendMessage", "data": { "receiverId": "usr_bob", "content": format!("m{i}") } }),
        )
        .await;
        let reply = recv_reply(&mut alice).await;
        assert_eq!(reply["ok"], true);
    }
    drain(&mut alice).await;

    send_action(
        &mut alice,
        json!({ "action": "getMessages", "data": { "receiverId": "usr_bob", "page": 1, "limit": 2 } }),
    )
    .await;

    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["data"]["total"], 3);
    assert_eq!(reply["data"]["page"], 1);
    assert_eq!(reply["data"]["limit"], 2);
    let messages = reply["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "m3");
    assert_eq!(messages[1]["content"], "m2");
}

#[tokio::test]
async fn unread_counts_and_chat_rooms() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    backend.add_user("usr_bob", "bob");
    backend.friendships.add_friends("usr_alice", "usr_bob");
    let addr = start_server(backend.state.clone()).await;

    let mut alice = connect(addr, &mint_token("usr_alice")).await;
    let mut bob = connect(addr, &mint_token("usr_bob")).await;
    drain(&mut alice).await;
    drain(&mut bob).await;

    for content in ["one", "two"] {
        send_action(
            &mut bob,
            json!({ "action": "sendMessage", "data": { "receiverId": "usr_alice", "content": content } }),
        )
        .await;
        recv_reply(&mut bob).await;
    }
    drain(&mut alice).await;

    send_action(&mut alice, json!({ "action": "getUnreadCount" })).await;
    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["data"]["unread"]["usr_bob"], 2);

    send_action(&mut alice, json!({ "action": "getChatRooms" })).await;
    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["ok"], true);
    let rooms = reply["data"]["rooms"].as_array().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["kind"], "direct");

    // Group conversations show up for every member, joined or not.
    backend.groups.insert_group("grp_1", &["usr_alice", "usr_bob"]);
    send_action(&mut bob, json!({ "action": "joinRoom", "data": { "groupId": "grp_1" } })).await;
    let reply = recv_reply(&mut bob).await;
    assert_eq!(reply["ok"], true);

    send_action(&mut alice, json!({ "action": "getChatRooms" })).await;
    let reply = recv_reply(&mut alice).await;
    let rooms = reply["data"]["rooms"].as_array().unwrap();
    assert_eq!(rooms.len(), 2);
    assert!(rooms.iter().any(|room| room["kind"] == "group"));
}

#[tokio::test]
async fn unparsable_frame_gets_error_reply_not_close() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    let addr = start_server(backend.state.clone()).await;

    let mut alice = connect(addr, &mint_token("usr_alice")).await;
    drain(&mut alice).await;

    send_action(&mut alice, json!({ "action": "selfDestruct", "data": {} })).await;
    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"]["kind"], "invalidPayload");

    // Connection stays usable.
    send_action(&mut alice, json!({ "action": "getUnreadCount" })).await;
    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["ok"], true);
}

#[tokio::test]
async fn programmatic_notification_reaches_all_devices() {
    let backend = TestBackend::new();
    backend.add_user("usr_alice", "alice");
    let addr = start_server(backend.state.clone()).await;

    let mut alice1 = connect(addr, &mint_token("usr_alice")).await;
    let mut alice2 = connect(addr, &mint_token("usr_alice")).await;
    drain(&mut alice1).await;
    drain(&mut alice2).await;

    backend.state.dispatch.emit_to_user(
        "usr_alice",
        chat_api::gateway::events::ServerEvent::Notification {
            message: "friend request".to_string(),
        },
    );

    for ws in [&mut alice1, &mut alice2] {
        let event = recv_event(ws, "notification").await;
        assert_eq!(event["data"]["message"], "friend request");
    }
}
