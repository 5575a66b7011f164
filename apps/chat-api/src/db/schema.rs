diesel::table! {
    users (id) {
        id -> Text,
        username -> Text,
        display_name -> Text,
        avatar_url -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    friendships (requester_id, addressee_id) {
        requester_id -> Text,
        addressee_id -> Text,
        status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    blocks (blocker_id, blocked_id) {
        blocker_id -> Text,
        blocked_id -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    groups (id) {
        id -> Text,
        name -> Text,
        owner_id -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    group_members (group_id, user_id) {
        group_id -> Text,
        user_id -> Text,
        joined_at -> Timestamptz,
    }
}

diesel::table! {
    chat_rooms (room_id) {
        room_id -> Text,
        kind -> Int2,
        user_low -> Nullable<Text>,
        user_high -> Nullable<Text>,
        group_id -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    messages (id) {
        id -> Int8,
        room_id -> Text,
        sender_id -> Text,
        kind -> Int2,
        content -> Nullable<Text>,
        file_url -> Nullable<Text>,
        file_name -> Nullable<Text>,
        file_size -> Nullable<Int8>,
        mime_type -> Nullable<Text>,
        is_read -> Bool,
        created_at -> Timestamptz,
    }
}
