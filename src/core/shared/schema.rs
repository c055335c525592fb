use diesel::prelude::*;

table! {
    users (id) {
        id -> Int8,
        name -> Text,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        role -> Text,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

table! {
    courses (id) {
        id -> Int8,
        name -> Text,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

table! {
    leads (id) {
        id -> Int8,
        name -> Text,
        phone -> Text,
        email -> Nullable<Text>,
        whatsapp -> Nullable<Text>,
        lead_source -> Text,
        lead_stage -> Text,
        lead_status -> Text,
        course_interest_id -> Nullable<Int8>,
        assigned_telecaller_id -> Nullable<Int8>,
        assigned_counselor_id -> Nullable<Int8>,
        address -> Nullable<Text>,
        city -> Nullable<Text>,
        state -> Nullable<Text>,
        pincode -> Nullable<Text>,
        notes -> Nullable<Text>,
        conversion_date -> Nullable<Timestamptz>,
        lost_reason -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    call_logs (id) {
        id -> Int8,
        lead_id -> Int8,
        caller_id -> Int8,
        call_date -> Timestamptz,
        stat_date -> Date,
        outcome -> Text,
        duration_seconds -> Nullable<Int4>,
        next_followup_date -> Nullable<Timestamptz>,
        notes -> Nullable<Text>,
        requested_stage -> Nullable<Text>,
        requested_by_role -> Text,
        effects_applied_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

table! {
    daily_call_stats (id) {
        id -> Int8,
        telecaller_id -> Int8,
        stat_date -> Date,
        calls_made -> Int4,
        calls_answered -> Int4,
        total_duration_seconds -> Int8,
        leads_contacted -> Int4,
        leads_converted -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(call_logs -> leads (lead_id));
diesel::joinable!(call_logs -> users (caller_id));
diesel::joinable!(daily_call_stats -> users (telecaller_id));
diesel::joinable!(leads -> courses (course_interest_id));

diesel::allow_tables_to_appear_in_same_query!(users, courses, leads, call_logs, daily_call_stats);
