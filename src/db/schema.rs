diesel::table! {
    users (id) {
        id -> Text,
        name -> Text,
        discord_snowflake -> Nullable<Text>,
        timezone -> Nullable<Text>,
        is_active -> Bool,
        point_giver -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    ledger (id) {
        id -> Text,
        bestower -> Text,
        recipient -> Text,
        points -> BigInt,
        created_at -> Text,
    }
}

diesel::table! {
    reminders (id) {
        id -> BigInt,
        owner -> Text,
        channel_id -> Text,
        original_message_id -> Text,
        reminder_text -> Text,
        remind_at -> Text,
        is_recurring -> Bool,
        recurrence_interval -> Nullable<BigInt>,
        status -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    trigger_groups (id) {
        id -> BigInt,
        owner -> Text,
        is_active -> Bool,
        delivery -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    trigger_patterns (id) {
        id -> BigInt,
        group_id -> BigInt,
        pattern -> Text,
        is_regex -> Bool,
    }
}

diesel::table! {
    trigger_responses (id) {
        id -> BigInt,
        group_id -> BigInt,
        response -> Text,
    }
}

diesel::joinable!(trigger_patterns -> trigger_groups (group_id));
diesel::joinable!(trigger_responses -> trigger_groups (group_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    ledger,
    reminders,
    trigger_groups,
    trigger_patterns,
    trigger_responses,
);
