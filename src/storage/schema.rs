//! Database schema definitions.
//!
//! Table and column identifiers for sea-query statement building, plus the
//! schema script. The script is written in the networked engine's dialect;
//! the embedded adapter translates it at bootstrap.

use sea_query::Iden;

/// Application accounts.
#[derive(Iden, Clone, Copy)]
pub enum Users {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "username"]
    Username,
    #[iden = "password_hash"]
    PasswordHash,
    #[iden = "role"]
    Role,
    #[iden = "name"]
    Name,
    #[iden = "nip"]
    Nip,
    #[iden = "mapel"]
    Mapel,
    #[iden = "is_active"]
    IsActive,
    #[iden = "last_login"]
    LastLogin,
    #[iden = "created_at"]
    CreatedAt,
}

/// Teachers table schema.
#[derive(Iden, Clone, Copy)]
pub enum Teachers {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "nama"]
    Nama,
    #[iden = "mapel"]
    Mapel,
    #[iden = "nip"]
    Nip,
    #[iden = "nuptk"]
    Nuptk,
    #[iden = "is_active"]
    IsActive,
}

/// Classes table schema.
#[derive(Iden, Clone, Copy)]
pub enum Classes {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "kode"]
    Kode,
    #[iden = "nama"]
    Nama,
    #[iden = "is_active"]
    IsActive,
}

/// Empty-classroom reports.
#[derive(Iden, Clone, Copy)]
pub enum Reports {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "tanggal"]
    Tanggal,
    #[iden = "kelas"]
    Kelas,
    #[iden = "guru"]
    Guru,
    #[iden = "waktu"]
    Waktu,
    #[iden = "keterangan"]
    Keterangan,
    #[iden = "foto_base64"]
    FotoBase64,
    #[iden = "status"]
    Status,
    #[iden = "verified_by"]
    VerifiedBy,
    #[iden = "verified_at"]
    VerifiedAt,
    #[iden = "rejection_note"]
    RejectionNote,
    #[iden = "created_at"]
    CreatedAt,
}

/// Teacher leave requests.
#[derive(Iden, Clone, Copy)]
pub enum TeacherLeaves {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "guru_id"]
    GuruId,
    #[iden = "tanggal_mulai"]
    TanggalMulai,
    #[iden = "tanggal_selesai"]
    TanggalSelesai,
    #[iden = "jenis_izin"]
    JenisIzin,
    #[iden = "alasan"]
    Alasan,
    #[iden = "nomor_surat"]
    NomorSurat,
    #[iden = "file_surat"]
    FileSurat,
    #[iden = "status"]
    Status,
    #[iden = "disetujui_oleh"]
    DisetujuiOleh,
    #[iden = "disetujui_oleh_nama"]
    DisetujuiOlehNama,
    #[iden = "tanggal_disetujui"]
    TanggalDisetujui,
    #[iden = "catatan"]
    Catatan,
    #[iden = "created_at"]
    CreatedAt,
}

/// Per-class coverage instructions belonging to a leave.
#[derive(Iden, Clone, Copy)]
pub enum ClassAssignments {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "leave_id"]
    LeaveId,
    #[iden = "kelas_id"]
    KelasId,
    #[iden = "nama_kelas"]
    NamaKelas,
    #[iden = "jam_pelajaran"]
    JamPelajaran,
    #[iden = "mata_pelajaran"]
    MataPelajaran,
    #[iden = "guru_pengganti"]
    GuruPengganti,
    #[iden = "guru_pengganti_id"]
    GuruPenggantiId,
    #[iden = "tugas"]
    Tugas,
    #[iden = "status_penyampaian"]
    StatusPenyampaian,
    #[iden = "waktu_disampaikan"]
    WaktuDisampaikan,
    #[iden = "disampaikan_oleh"]
    DisampaikanOleh,
}

/// Names of the tables the schema creates, in creation order.
pub const TABLES: [&str; 6] = [
    "users",
    "teachers",
    "classes",
    "reports",
    "teacher_leaves",
    "class_assignments",
];

/// Schema script in the networked dialect.
///
/// Every statement is `CREATE TABLE IF NOT EXISTS` so the networked adapter
/// can apply it against an existing database.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INT(11) AUTO_INCREMENT PRIMARY KEY,
    username VARCHAR(50) NOT NULL UNIQUE,
    password_hash VARCHAR(255) NOT NULL,
    role ENUM('SUPER_ADMIN','ADMIN','OPERATOR','STUDENT','TEACHER') NOT NULL,
    name VARCHAR(100) NOT NULL,
    nip VARCHAR(30) NULL,
    mapel VARCHAR(100) NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    last_login DATETIME NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;

CREATE TABLE IF NOT EXISTS teachers (
    id INT(11) AUTO_INCREMENT PRIMARY KEY,
    nama VARCHAR(100) NOT NULL,
    mapel VARCHAR(100) NOT NULL,
    nip VARCHAR(30) NULL,
    nuptk VARCHAR(30) NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;

CREATE TABLE IF NOT EXISTS classes (
    id INT(11) AUTO_INCREMENT PRIMARY KEY,
    kode VARCHAR(20) NOT NULL UNIQUE,
    nama VARCHAR(100) NOT NULL UNIQUE,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;

CREATE TABLE IF NOT EXISTS reports (
    id INT(11) AUTO_INCREMENT PRIMARY KEY,
    tanggal DATETIME NOT NULL,
    kelas VARCHAR(100) NOT NULL,
    guru VARCHAR(100) NOT NULL,
    waktu VARCHAR(50) NOT NULL,
    keterangan TEXT NOT NULL,
    foto_base64 LONGTEXT NULL,
    status ENUM('pending','verified','rejected') NOT NULL DEFAULT 'pending',
    verified_by INT(11) NULL,
    verified_at DATETIME NULL,
    rejection_note TEXT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;

CREATE TABLE IF NOT EXISTS teacher_leaves (
    id INT(11) AUTO_INCREMENT PRIMARY KEY,
    guru_id INT(11) NOT NULL,
    tanggal_mulai DATE NOT NULL,
    tanggal_selesai DATE NOT NULL,
    jenis_izin ENUM('SAKIT','IZIN','DINAS','CUTI','LAINNYA') NOT NULL,
    alasan TEXT NOT NULL,
    nomor_surat VARCHAR(100) NULL,
    file_surat LONGTEXT NULL,
    status ENUM('pending','approved','rejected','notified') NOT NULL DEFAULT 'pending',
    disetujui_oleh INT(11) NULL,
    disetujui_oleh_nama VARCHAR(100) NULL,
    tanggal_disetujui DATETIME NULL,
    catatan TEXT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (guru_id) REFERENCES teachers(id)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;

CREATE TABLE IF NOT EXISTS class_assignments (
    id INT(11) AUTO_INCREMENT PRIMARY KEY,
    leave_id INT(11) NOT NULL,
    kelas_id INT(11) NULL,
    nama_kelas VARCHAR(100) NOT NULL,
    jam_pelajaran VARCHAR(50) NOT NULL,
    mata_pelajaran VARCHAR(100) NOT NULL,
    guru_pengganti VARCHAR(100) NOT NULL,
    guru_pengganti_id INT(11) NULL,
    tugas TEXT NOT NULL,
    status_penyampaian ENUM('belum','sudah') NOT NULL DEFAULT 'belum',
    waktu_disampaikan DATETIME NULL,
    disampaikan_oleh VARCHAR(100) NULL,
    FOREIGN KEY (leave_id) REFERENCES teacher_leaves(id) ON DELETE CASCADE,
    FOREIGN KEY (kelas_id) REFERENCES classes(id)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
"#;
